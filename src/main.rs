fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = novel_archiver::cli::Args::parse();
    novel_archiver::cli::init_logging(args.verbose, args.quiet);
    if let Err(e) = novel_archiver::cli::run(&args) {
        eprintln!("{}", e);
        if args.verbose > 0 {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
