use teloxide::utils::command::BotCommands;

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show usage
    #[command(description = "Show usage.")]
    Help,
    /// List archived audio
    #[command(description = "Show your archived audio.")]
    Playlist,
    /// Remove archived audio by title
    #[command(description = "Remove audio by title: /delete <title>.")]
    Delete(String),
}
