use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(about = "A cashu mint written in rust", author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"))]
pub struct CLIArgs {
    #[arg(
        short,
        long,
        help = "Use the <directory> as the location of the database and logs",
        required = false
    )]
    pub work_dir: Option<PathBuf>,
    #[arg(
        short,
        long,
        help = "Use the <file name> as the location of the config file",
        required = false
    )]
    pub config: Option<PathBuf>,
    #[arg(long, help = "Write logs to stdout and the work directory")]
    pub enable_logging: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse() {
        let args = CLIArgs::parse_from([
            "cmk-mintd",
            "--work-dir",
            "/tmp/mint",
            "--enable-logging",
        ]);

        assert_eq!(args.work_dir, Some(PathBuf::from("/tmp/mint")));
        assert_eq!(args.config, None);
        assert!(args.enable_logging);
    }
}
