#[cfg(feature = "cli")]
mod cli;

#[cfg(feature = "cli")]
fn main() {
    if let Err(err) = cli::run() {
        eprintln!("{}", cli::failure_message(err.as_ref()));
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!(
        "depot-web was built without its command-line interface. \
         Rebuild with `--features cli` to serve or query a depot."
    );
}
