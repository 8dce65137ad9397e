use clap::Parser;
use wordsuggest_app_lib::CliArgs;

fn main() -> anyhow::Result<()> {
    wordsuggest_app_lib::run(CliArgs::parse())
}
