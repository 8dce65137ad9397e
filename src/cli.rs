use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "wordsuggest", about = "WordSuggest - word and phrase suggestions for selected text")]
pub struct CliArgs {
    /// Settings file (created with defaults when missing)
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Never call the remote provider
    #[arg(long)]
    pub local_only: bool,

    /// Enable debug logging to the console
    #[arg(long)]
    pub debug: bool,

    /// Suggest for this text once and exit; otherwise read one selection per stdin line
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_text() {
        let args = CliArgs::parse_from([
            "wordsuggest",
            "--settings",
            "/tmp/ws.json",
            "--local-only",
            "--debug",
            "good",
        ]);
        assert_eq!(args.settings, Some(PathBuf::from("/tmp/ws.json")));
        assert!(args.local_only);
        assert!(args.debug);
        assert_eq!(args.text.as_deref(), Some("good"));
    }

    #[test]
    fn defaults_to_interactive_mode() {
        let args = CliArgs::parse_from(["wordsuggest"]);
        assert!(args.text.is_none());
        assert!(!args.local_only);
        assert!(!args.debug);
    }
}
