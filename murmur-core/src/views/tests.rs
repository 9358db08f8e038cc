use super::*;
use crate::api::{ApiError, InMemoryCommunity};
use crate::reply::{provisional_comment, ReplyContext};
use murmur_types::{EntityId, EventKind, MutationKind, PollTally};
use uuid::Uuid;

fn viewer() -> Author {
    Author::new(Uuid::new_v4(), "viewer")
}

fn setup() -> (Rc<InMemoryCommunity>, Engine) {
    let api = Rc::new(InMemoryCommunity::new(viewer()));
    let remote: Rc<dyn CommunityApi> = api.clone();
    (api, Engine::new(remote, LogConfig::disabled()))
}

/// A post the server already knows about
fn seeded_post(api: &InMemoryCommunity, is_liked: bool, like_count: u32) -> EntitySnapshot {
    let id = EntityId::Stable(Uuid::new_v4());
    api.seed_like(id, is_liked, like_count);
    EntitySnapshot::new(id).with_likes(is_liked, like_count)
}

/// A confirmed comment, optionally replying to `parent`
fn stable_comment(post_id: EntityId, name: &str, parent: Option<&Comment>) -> Comment {
    let ctx = parent.map(ReplyContext::for_target);
    let author = Author::new(Uuid::new_v4(), name);
    let mut comment = provisional_comment(post_id, &author, "existing", ctx.as_ref());
    comment.id = EntityId::Stable(Uuid::new_v4());
    comment.reaction = EntitySnapshot::new(comment.id);
    comment
}

/// Thread R -> C1 -> C2, seeded on the server. Returns (nested root, c1, c2).
fn three_level_thread(api: &InMemoryCommunity, post_id: EntityId) -> (Comment, Comment, Comment) {
    let root = stable_comment(post_id, "ada", None);
    let c1 = stable_comment(post_id, "bob", Some(&root));
    let c2 = stable_comment(post_id, "cy", Some(&c1));

    let mut nested = root.clone();
    let mut middle = c1.clone();
    middle.replies.push(c2.clone());
    nested.replies.push(middle);
    api.seed_comment(&nested);
    (nested, c1, c2)
}

#[tokio::test]
async fn test_like_confirmation_converges_both_views() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 4);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let header = engine.mount_entity(EntityKind::Post, post);

    let confirmed = card.toggle_like().await.unwrap();

    assert!(confirmed.is_liked);
    assert_eq!(confirmed.like_count, 5);
    assert_eq!((card.is_liked(), card.like_count()), (true, 5));
    assert_eq!(
        (header.is_liked(), header.like_count()),
        (true, 5),
        "Other view should adopt the confirmed value"
    );
    assert!(card.error().is_none());
}

#[tokio::test]
async fn test_like_uses_authoritative_count() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 4);
    api.add_external_like(post.id);
    let card = engine.mount_entity(EntityKind::Post, post);

    card.toggle_like().await.unwrap();

    assert_eq!(card.like_count(), 6, "Server count wins over the local guess");
}

#[tokio::test]
async fn test_rejected_like_reverts_origin_only_and_publishes_nothing() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 4);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let header = engine.mount_entity(EntityKind::Post, post);
    api.fail_next(ApiError::Api("internal error".to_string()));

    let result = card.toggle_like().await;

    assert!(matches!(result, Err(MutationError::Remote(_))));
    assert_eq!((card.is_liked(), card.like_count()), (false, 4));
    assert_eq!((header.is_liked(), header.like_count()), (false, 4));
    let message = card.error().unwrap();
    assert!(message.starts_with("Server Error"), "got: {}", message);
    assert!(header.error().is_none(), "Only the originating view shows the error");
}

#[tokio::test]
async fn test_error_flag_clears_on_next_attempt() {
    let (api, engine) = setup();
    let card = engine.mount_entity(EntityKind::Post, seeded_post(&api, false, 0));
    api.fail_next(ApiError::Network("timeout".to_string()));

    assert!(card.toggle_like().await.is_err());
    assert!(card.error().unwrap().starts_with("Network Error"));

    card.toggle_like().await.unwrap();
    assert!(card.error().is_none());
}

#[tokio::test]
async fn test_second_toggle_while_in_flight_is_ignored() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 4);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let header = engine.mount_entity(EntityKind::Post, post);
    api.pause();

    // join! polls the first branch first, so the first toggle is admitted
    let (first, second) = tokio::join!(card.toggle_like(), async {
        assert!(card.is_pending(MutationKind::Like));
        assert_eq!(card.like_count(), 5, "Speculative value is shown");
        assert_eq!(header.like_count(), 4, "Other views wait for confirmation");

        let second = card.toggle_like().await;
        api.resume();
        second
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(MutationError::InFlight { .. })));
    assert_eq!(api.call_count(), 1, "Rejected attempt never reached the server");
    assert_eq!((card.is_liked(), card.like_count()), (true, 5));
    assert!(card.error().is_none(), "In-flight rejection is silent");
}

#[tokio::test]
async fn test_unmounted_view_stops_receiving_events() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let header = engine.mount_entity(EntityKind::Post, post);
    assert_eq!(engine.bus().subscriber_count(EventKind::ReactionUpdated), 2);

    drop(header);
    assert_eq!(engine.bus().subscriber_count(EventKind::ReactionUpdated), 1);

    card.toggle_like().await.unwrap();
    assert_eq!(card.like_count(), 1);
}

#[tokio::test]
async fn test_view_dropped_mid_flight_still_broadcasts() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 2);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let header = engine.mount_entity(EntityKind::Post, post);
    api.pause();

    let pending = card.toggle_like();
    let (result, ()) = tokio::join!(pending, async {
        drop(card);
        api.resume();
    });

    let confirmed = result.unwrap();
    assert_eq!(confirmed.like_count, 3);
    assert_eq!(header.like_count(), 3);
}

#[tokio::test]
async fn test_poll_vote_converges_and_ignores_repeat() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0).with_poll(PollTally::with_options([1, 2]));
    api.seed_poll(post.id, [1, 2]);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let header = engine.mount_entity(EntityKind::Post, post);

    card.vote_poll(1).await.unwrap();
    let poll = header.poll().unwrap();
    assert_eq!(poll.voted_option, Some(1));
    assert_eq!(poll.votes_for(1), 1);

    // Same option again: nothing sent
    card.vote_poll(1).await.unwrap();
    assert_eq!(api.call_count(), 1);

    card.vote_poll(2).await.unwrap();
    let poll = header.poll().unwrap();
    assert_eq!((poll.votes_for(1), poll.votes_for(2)), (0, 1));
    assert_eq!(card.poll(), header.poll());
}

#[tokio::test]
async fn test_unknown_poll_option_is_rejected_locally() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0).with_poll(PollTally::with_options([1, 2]));
    let card = engine.mount_entity(EntityKind::Post, post);

    let result = card.vote_poll(9).await;

    assert!(matches!(result, Err(MutationError::UnknownPollOption(9))));
    assert_eq!(api.call_count(), 0);
    assert!(card.error().unwrap().starts_with("Validation Error"));
}

#[tokio::test]
async fn test_failed_poll_vote_restores_tally() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0).with_poll(PollTally::with_options([1, 2]));
    api.seed_poll(post.id, [1, 2]);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    api.fail_next(ApiError::Network("offline".to_string()));

    assert!(card.vote_poll(2).await.is_err());
    assert_eq!(card.poll(), post.poll);
}

#[tokio::test]
async fn test_reply_to_depth_two_lands_at_depth_three() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0).with_comment_count(3);
    let (root, _c1, c2) = three_level_thread(&api, post.id);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let thread = engine.open_thread(post, viewer(), vec![root.clone()]);

    let ctx = thread.reply_to(c2.id).unwrap();
    assert_eq!(ctx.new_reply_depth, 3);
    assert_eq!(ctx.root_comment_id, root.id);
    assert_eq!(ctx.target_author_name, "cy");

    thread.set_draft("deeper");
    let reply = thread.submit().await.unwrap();

    assert!(reply.id.is_stable());
    assert_eq!(reply.depth, 3);
    assert_eq!(reply.root_comment_id, Some(root.id));
    assert_eq!(reply.parent_id, Some(c2.id));
    assert_eq!(reply.mentioned_user_id, Some(c2.author_id));

    assert!(thread.comment(reply.id).is_some());
    assert!(thread.tree().iter().all(|comment| !comment.is_provisional()));
    assert!(thread.tree().check_invariants().is_ok());
    assert_eq!(thread.displayed_total(), 4);
    assert_eq!(thread.comment_count(), 4);
    assert_eq!(card.comment_count(), 4, "Feed card follows the confirmed count");

    assert!(thread.draft().is_empty());
    assert!(thread.reply_context().is_none());
    assert_eq!(thread.last_reply_context(), Some(ctx));
}

#[tokio::test]
async fn test_provisional_comment_is_visible_while_pending() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let thread = engine.open_thread(post, viewer(), Vec::new());
    thread.set_draft("first!");
    api.pause();

    let (result, ()) = tokio::join!(thread.submit(), async {
        assert_eq!(thread.displayed_total(), 1);
        assert!(thread.tree().roots()[0].is_provisional());
        assert_eq!(thread.comment_count(), 1);
        assert_eq!(card.comment_count(), 0, "Not confirmed yet");
        assert!(thread.draft().is_empty(), "Input clears on submit");
        api.resume();
    });

    let comment = result.unwrap();
    assert_eq!(thread.tree().roots()[0].id, comment.id);
    assert_eq!(card.comment_count(), 1);
}

#[tokio::test]
async fn test_failed_reply_restores_draft_and_context() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0).with_comment_count(3);
    let (root, _c1, _c2) = three_level_thread(&api, post.id);
    let thread = engine.open_thread(post, viewer(), vec![root.clone()]);

    let ctx = thread.reply_to(root.id).unwrap();
    thread.set_draft("hello");
    api.fail_next(ApiError::Network("connection reset".to_string()));

    let result = thread.submit().await;

    assert!(matches!(result, Err(MutationError::Remote(ApiError::Network(_)))));
    assert_eq!(thread.draft(), "hello", "Typed text is restored");
    assert_eq!(thread.reply_context(), Some(ctx));
    assert_eq!(thread.displayed_total(), 3, "Provisional comment removed");
    assert_eq!(thread.comment_count(), 3);
    assert!(thread.last_reply_context().is_none());
    assert!(thread.error().unwrap().starts_with("Network Error"));
}

#[tokio::test]
async fn test_blank_and_oversized_comments_are_rejected() {
    let (api, engine) = setup();
    let engine = engine.with_max_comment_chars(5);
    let thread = engine.open_thread(seeded_post(&api, false, 0), viewer(), Vec::new());

    thread.set_draft("   ");
    assert!(matches!(thread.submit().await, Err(MutationError::EmptyContent)));
    assert_eq!(thread.draft(), "   ", "Rejected input is left alone");

    let result = thread.add_reply(None, "toolong".to_string()).await;
    assert!(matches!(
        result,
        Err(MutationError::ContentTooLong { max: 5, actual: 7 })
    ));

    // Counted in characters, not bytes
    assert!(thread.add_reply(None, "héllo".to_string()).await.is_ok());
    assert_eq!(api.call_count(), 1);
}

#[tokio::test]
async fn test_reply_to_missing_parent_aborts_without_changes() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0).with_comment_count(1);
    let (root, _c1, _c2) = three_level_thread(&api, post.id);
    let stranger = stable_comment(post.id, "eve", None);
    let thread = engine.open_thread(post, viewer(), vec![root]);

    let ctx = ReplyContext::for_target(&stranger);
    let result = thread.add_reply(Some(ctx), "into the void".to_string()).await;

    assert!(matches!(result, Err(MutationError::ParentNotFound(id)) if id == stranger.id));
    assert_eq!(thread.displayed_total(), 3);
    assert_eq!(thread.comment_count(), 1);
    assert_eq!(api.call_count(), 0);
    assert!(!engine
        .coordinator()
        .is_in_flight(thread.post_id(), MutationKind::Comment));
}

#[tokio::test]
async fn test_reply_again_offered_only_when_idle_and_blank() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let (root, c1, _c2) = three_level_thread(&api, post.id);
    let thread = engine.open_thread(post, viewer(), vec![root]);
    assert!(!thread.can_reply_again());

    thread.reply_to(c1.id).unwrap();
    thread.set_draft("one");
    thread.submit().await.unwrap();
    assert!(thread.can_reply_again());

    thread.set_draft("typing");
    assert!(!thread.can_reply_again());
    assert!(thread.reply_again().is_none());

    thread.set_draft("");
    let ctx = thread.reply_again().unwrap();
    assert_eq!(ctx.target_comment_id, c1.id);
    assert_eq!(thread.reply_context(), Some(ctx));
    assert!(!thread.can_reply_again(), "Already composing");

    thread.cancel_reply();
    assert!(thread.reply_context().is_none());
}

#[tokio::test]
async fn test_closing_thread_mid_submission() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let thread = engine.open_thread(post, viewer(), Vec::new());
    api.pause();

    let pending = thread.add_reply(None, "late".to_string());
    let (result, ()) = tokio::join!(pending, async {
        thread.close();
        api.resume();
    });

    assert!(result.is_ok(), "Server still accepts the comment");
    assert_eq!(card.comment_count(), 1);
    assert_eq!(engine.bus().subscriber_count(EventKind::CommentCountUpdated), 1);
    assert_eq!(engine.coordinator().in_flight_count(), 0);
}

#[tokio::test]
async fn test_comment_like_converges_thread_and_card() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let (root, c1, _c2) = three_level_thread(&api, post.id);
    let thread = engine.open_thread(post.clone(), viewer(), vec![root]);
    let other_thread = engine.open_thread(post, viewer(), vec![thread.tree().roots()[0].clone()]);
    let card = engine.mount_entity(EntityKind::Comment, c1.reaction.clone());

    let confirmed = thread.toggle_comment_like(c1.id).await.unwrap();

    assert_eq!((confirmed.is_liked, confirmed.like_count), (true, 1));
    assert_eq!(thread.comment(c1.id).unwrap().reaction, confirmed);
    assert_eq!(other_thread.comment(c1.id).unwrap().reaction, confirmed);
    assert_eq!((card.is_liked(), card.like_count()), (true, 1));
}

#[tokio::test]
async fn test_failed_comment_like_reverts_only_that_node() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let (root, c1, c2) = three_level_thread(&api, post.id);
    let thread = engine.open_thread(post, viewer(), vec![root]);
    api.fail_next(ApiError::Unauthorized("expired".to_string()));

    assert!(thread.toggle_comment_like(c1.id).await.is_err());

    assert!(!thread.comment(c1.id).unwrap().reaction.is_liked);
    assert_eq!(thread.comment(c2.id).unwrap().reaction, c2.reaction);
    assert!(thread.error().unwrap().starts_with("Authorization Error"));
}

#[tokio::test]
async fn test_thread_summary_tracks_activity_and_commenters() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let (root, _c1, _c2) = three_level_thread(&api, post.id);
    let thread = engine.open_thread(post, api.viewer().clone(), vec![root]);
    assert_eq!(thread.commenters(), vec!["ada", "bob", "cy"]);

    let before = thread.last_activity().unwrap();
    let comment = thread.add_reply(None, "hi".to_string()).await.unwrap();

    assert_eq!(thread.commenters(), vec!["ada", "bob", "cy", "viewer"]);
    assert!(comment.created_at >= before);
    assert_eq!(thread.last_activity(), Some(comment.created_at));
}

#[tokio::test]
async fn test_reconcile_cache_swaps_provisional_for_authoritative() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let thread = engine.open_thread(post.clone(), viewer(), Vec::new());
    thread.set_draft("pending");
    api.pause();

    let (result, ()) = tokio::join!(thread.submit(), async {
        let provisional = thread.tree().roots()[0].clone();
        let mut authoritative = provisional.clone();
        authoritative.id = EntityId::Stable(Uuid::new_v4());
        assert!(thread.reconcile_cache(provisional.id, authoritative.clone()));
        assert!(thread.comment(provisional.id).is_none());
        assert!(!thread.reconcile_cache(provisional.id, authoritative));
        api.resume();
    });

    // The submission's own reconcile finds nothing left to swap
    assert!(result.is_ok());
    assert_eq!(thread.displayed_total(), 1);
}

#[tokio::test]
async fn test_reply_started_on_pending_comment_follows_its_stable_id() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let thread = engine.open_thread(post, viewer(), Vec::new());
    thread.set_draft("top");
    api.pause();

    let (result, ()) = tokio::join!(thread.submit(), async {
        let pending = thread.tree().roots()[0].id;
        assert!(pending.is_provisional());
        thread.reply_to(pending).unwrap();
        api.resume();
    });

    let top = result.unwrap();
    let ctx = thread.reply_context().unwrap();
    assert_eq!(ctx.target_comment_id, top.id);
    assert_eq!(ctx.root_comment_id, top.id);

    thread.set_draft("reply");
    let reply = thread.submit().await.unwrap();

    assert_eq!(reply.parent_id, Some(top.id));
    assert_eq!(reply.root_comment_id, Some(top.id));
    assert_eq!(reply.depth, 1);
    assert_eq!(thread.displayed_total(), 2);
    assert!(thread.tree().check_invariants().is_ok());
    assert_eq!(thread.last_reply_context().unwrap().target_comment_id, top.id);
}

#[tokio::test]
async fn test_top_level_comment_ends_reply_again() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let (root, c1, _c2) = three_level_thread(&api, post.id);
    let thread = engine.open_thread(post, viewer(), vec![root]);

    thread.reply_to(c1.id).unwrap();
    thread.set_draft("reply");
    thread.submit().await.unwrap();
    assert!(thread.can_reply_again());

    thread.add_reply(None, "top".to_string()).await.unwrap();

    assert!(!thread.can_reply_again());
    assert!(thread.last_reply_context().is_none());
    assert!(thread.reply_again().is_none());
}

#[tokio::test]
async fn test_reconcile_cache_retargets_active_reply() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0);
    let thread = engine.open_thread(post, viewer(), Vec::new());
    thread.set_draft("pending");
    api.pause();

    let (result, ()) = tokio::join!(thread.submit(), async {
        let provisional = thread.tree().roots()[0].clone();
        thread.reply_to(provisional.id).unwrap();
        let mut authoritative = provisional.clone();
        authoritative.id = EntityId::Stable(Uuid::new_v4());
        assert!(thread.reconcile_cache(provisional.id, authoritative.clone()));

        let ctx = thread.reply_context().unwrap();
        assert_eq!(ctx.target_comment_id, authoritative.id);
        assert_eq!(ctx.root_comment_id, authoritative.id);
        api.resume();
    });

    assert!(result.is_ok());
    assert!(thread.reply_context().unwrap().target_comment_id.is_stable());
}

#[tokio::test]
async fn test_poll_vote_is_speculative_while_pending() {
    let (api, engine) = setup();
    let post = seeded_post(&api, false, 0).with_poll(PollTally::with_options([1, 2]));
    api.seed_poll(post.id, [1, 2]);
    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let header = engine.mount_entity(EntityKind::Post, post.clone());
    api.pause();

    let (result, ()) = tokio::join!(card.vote_poll(2), async {
        let poll = card.poll().unwrap();
        assert_eq!(poll.voted_option, Some(2));
        assert_eq!(poll.votes_for(2), 1);
        assert!(card.is_pending(MutationKind::PollVote));
        assert_eq!(header.poll(), post.poll, "Other views wait for the server");
        api.resume();
    });

    assert!(result.is_ok());
    assert_eq!(header.poll(), card.poll());
}
