fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = ficfetch::cli::Args::parse();
    match ficfetch::cli::run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}", e);
            if args.debug {
                let mut source = e.source();
                while let Some(s) = source {
                    eprintln!("  cause: {}", s);
                    source = s.source();
                }
            }
            std::process::exit(e.exit_code());
        }
    }
}
