use anyhow::Result;
use clap::Parser;
use murmur::{
    init_logging, Engine, EntityView, InMemoryCommunity, MutationError, Settings, ThreadView,
};
use murmur_types::{Author, Comment, EntityId, EntityKind, EntitySnapshot, PollTally};
use std::path::PathBuf;
use std::rc::Rc;
use uuid::Uuid;

/// Murmur - optimistic mutations that stay in sync across views
#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Run a like / reply / poll session against an in-memory community")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, short, env = "MURMUR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    /// Make every remote call fail to watch the rollbacks
    #[arg(long)]
    fail_remote: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.logging.verbose |= cli.verbose;
    init_logging(&settings.log_config())?;
    log::info!(
        "Starting session (max comment length {})",
        settings.comments.max_comment_chars
    );

    let viewer = Author::new(Uuid::new_v4(), "you");
    let community = Rc::new(InMemoryCommunity::new(viewer.clone()));
    let (post, thread) = seed_community(&community);
    let engine = Engine::from_settings(community.clone(), &settings);

    let card = engine.mount_entity(EntityKind::Post, post.clone());
    let detail = engine.open_thread(post, viewer, thread);
    community.set_failing(cli.fail_remote);

    print_state("initial", &card, &detail);

    report("like from the feed card", card.toggle_like().await.map(|_| ()));
    print_state("after like", &card, &detail);

    let deepest = detail
        .tree()
        .iter()
        .max_by_key(|comment| comment.depth)
        .map(|comment| comment.id);
    if let Some(target) = deepest {
        detail.reply_to(target)?;
    }
    detail.set_draft("Agreed, and here is why.");
    report("reply to the deepest comment", detail.submit().await.map(|_| ()));
    print_state("after reply", &card, &detail);

    report("vote for option 2", card.vote_poll(2).await.map(|_| ()));
    print_state("after vote", &card, &detail);

    if detail.can_reply_again() {
        detail.reply_again();
        detail.set_draft("One more thing.");
        report("reply again", detail.submit().await.map(|_| ()));
        print_state("after second reply", &card, &detail);
    }

    detail.close();
    log::info!("Session finished after {} remote call(s)", community.call_count());
    Ok(())
}

/// A post with a three-level thread and a two-option poll
fn seed_community(community: &InMemoryCommunity) -> (EntitySnapshot, Vec<Comment>) {
    let post_id = EntityId::Stable(Uuid::new_v4());
    community.seed_like(post_id, false, 4);
    community.seed_poll(post_id, [1, 2]);

    let mut root = seeded_comment(post_id, "ada", "Shipping this on Friday?", None);
    let mut middle = seeded_comment(post_id, "bob", "Only if the tests pass.", Some(&root));
    let leaf = seeded_comment(post_id, "cy", "They never do on Fridays.", Some(&middle));
    middle.replies.push(leaf);
    root.replies.push(middle);
    community.seed_comment(&root);

    let post = EntitySnapshot::new(post_id)
        .with_likes(false, 4)
        .with_comment_count(3)
        .with_poll(PollTally::with_options([1, 2]));
    (post, vec![root])
}

fn seeded_comment(post_id: EntityId, name: &str, content: &str, parent: Option<&Comment>) -> Comment {
    let context = parent.map(murmur::ReplyContext::for_target);
    let author = Author::new(Uuid::new_v4(), name);
    let mut comment = murmur::reply::provisional_comment(post_id, &author, content, context.as_ref());
    comment.id = EntityId::Stable(Uuid::new_v4());
    comment.reaction = EntitySnapshot::new(comment.id);
    comment
}

fn report(action: &str, result: Result<(), MutationError>) {
    match result {
        Ok(()) => println!("✓ {}", action),
        Err(err) => println!("✗ {}: {}", action, murmur::categorize_error(&err)),
    }
}

fn print_state(label: &str, card: &EntityView, detail: &ThreadView) {
    let header = detail.post();
    println!("── {} ──", label);
    println!(
        "  feed card : liked={} likes={} comments={} poll={:?}",
        card.is_liked(),
        card.like_count(),
        card.comment_count(),
        card.poll().map(|poll| poll.results)
    );
    println!(
        "  detail    : liked={} likes={} comments={} shown={} commenters={}",
        header.is_liked,
        header.like_count,
        header.comment_count,
        detail.displayed_total(),
        detail.commenters().join(", ")
    );
    for comment in detail.tree().iter() {
        println!(
            "  {}{} ({}): {}",
            "  ".repeat(comment.depth as usize),
            comment.author_name,
            if comment.is_provisional() { "pending" } else { "saved" },
            comment.content
        );
    }
    if let Some(err) = card.error().or_else(|| detail.error()) {
        println!("  error     : {}", err);
    }
}
