use std::process;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "nanoc",
    about = "nanoc — compile a minimal C subset to x86-64 assembly"
)]
struct Cli {
    /// Source text of one translation unit.
    source: String,
}

fn main() {
    // Usage errors exit 1, not clap's default 2; --help/--version stay 0.
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        process::exit(if err.use_stderr() { 1 } else { 0 });
    });

    match nanoc_compiler::compile(&cli.source) {
        Ok(asm) => print!("{asm}"),
        Err(err) => {
            eprintln!("{}", err.render(&cli.source));
            process::exit(1);
        }
    }
}
