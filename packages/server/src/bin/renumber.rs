//! Rewrite member and/or visitor display numbers sequentially, in creation
//! order, starting again at `00101` / `V00101`.
//!
//! ```bash
//! renumber members
//! renumber all
//! ```

use anyhow::{Context, Result};
use api::settings::Settings;
use clap::{Parser, ValueEnum};
use store::{ChurchStore, PersonKind};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Target {
    Members,
    Visitors,
    All,
}

impl Target {
    fn kinds(self) -> &'static [PersonKind] {
        match self {
            Target::Members => &[PersonKind::Member],
            Target::Visitors => &[PersonKind::Visitor],
            Target::All => &[PersonKind::Member, PersonKind::Visitor],
        }
    }
}

#[derive(Parser)]
#[command(name = "renumber", about = "Renumber members and visitors sequentially", version)]
struct Cli {
    /// Which records to renumber
    #[arg(value_enum)]
    target: Target,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new().context("Failed to load settings")?;
    server::init_tracing();

    let store = server::connect_store(&settings).await?;
    for &kind in cli.target.kinds() {
        let count = store
            .renumber(kind)
            .await
            .with_context(|| format!("Failed to renumber {:?} records", kind))?;
        let label = match kind {
            PersonKind::Member => "members",
            PersonKind::Visitor => "visitors",
        };
        println!("Renumbered {} {}", count, label);
    }
    Ok(())
}
