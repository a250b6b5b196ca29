use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use forge_core::request::ContentType;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "forge", version, about = "Staged multi-provider content generation")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to ~/.forge/config.toml, then ./forge.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the Foundation -> Enhancement -> Finalization pipeline for one subject.
    Run(RunArgs),
    /// List configured providers and their pool limits.
    Providers(ProvidersArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub subject: String,

    #[arg(long)]
    pub keyword: Option<String>,

    /// article | guide | faq | service_page
    #[arg(long, default_value = "article", value_parser = parse_content_type)]
    pub content_type: ContentType,

    #[arg(long)]
    pub min_words: Option<usize>,

    #[arg(long)]
    pub tone: Option<String>,

    #[arg(long)]
    pub audience: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write the full run record (stages, outcomes, artifact) as JSON.
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long)]
    pub no_progress: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ProvidersArgs {
    #[arg(long)]
    pub json: bool,
}

fn parse_content_type(s: &str) -> Result<ContentType, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_defaults() {
        let args = Args::try_parse_from(["forge", "run", "--subject", "Oil change"]).unwrap();
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.subject, "Oil change");
        assert_eq!(run.content_type, ContentType::Article);
        assert_eq!(run.format, OutputFormat::Text);
        assert!(run.out.is_none());
    }

    #[test]
    fn test_run_args_content_type_and_global_config() {
        let args = Args::try_parse_from([
            "forge",
            "run",
            "--subject",
            "Brakes",
            "--content-type",
            "faq",
            "--format",
            "jsonl",
            "--config",
            "/tmp/forge.toml",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/forge.toml")));
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.content_type, ContentType::Faq);
        assert_eq!(run.format, OutputFormat::Jsonl);
    }

    #[test]
    fn test_unknown_content_type_is_rejected() {
        let err = Args::try_parse_from(["forge", "run", "--subject", "x", "--content-type", "poem"])
            .unwrap_err();
        assert!(err.to_string().contains("unknown content type"));
    }
}
