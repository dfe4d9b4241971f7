//! 🚀 ircn-cli — the front door, the bouncer, the maitre d' of ircnotify.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that sets up logging,
//! resolves the config path, and then lets the real code do the heavy
//! lifting. Like a manager. 🦆

use std::path::Path;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🚀 main() — where it all begins. The genesis. The big bang.
/// The "I pressed Enter and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Grab the config path arg (or don't, we're not picky)
/// 3. Run the thing (tail it and pray 🙏)
/// 4. Handle errors (cry, but with structure)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing — because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 🎯 One optional positional argument: the root config path.
    // No flags. No subcommands. We are a daemon, not a Swiss Army knife.
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(Path::new);
    if let Some(path) = config_path
        && !path.is_file()
    {
        // 💤 Not an error — first boot just means the store conjures a
        // default config into existence and carries on like nothing happened
        info!(
            path = %path.display(),
            "🔧 config file not found yet — it will be created with defaults"
        );
    }

    // 🚀 SEND IT. No take-backs. The logs are already scrolling somewhere.
    let result = ircn::run(config_path).await;

    // 💀 Error handling: the part where we find out what went wrong
    // and print it in a way that's helpful at 3am
    if let Err(err) = result {
        error!("💀 error: {err}");
        // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {cause}");
        }
        // 🗑️ Exit with prejudice. Process exitus maximus.
        std::process::exit(1);
    }

    // ✅ If we got here, someone pressed ctrl-c and everything shut down
    // cleanly. Pop the champagne. 🍾 (or at least close the terminal tab
    // with a sense of accomplishment)
    Ok(())
}
