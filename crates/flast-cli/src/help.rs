// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Usage text.

use crate::output;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn print_usage(program: &str) {
    println!("Flast compiler {}", VERSION);
    println!();
    println!(
        "{} {} {} {}",
        output::section_header("Usage:"),
        output::command(program),
        output::arg("<input.fls>"),
        output::arg("[options]")
    );
    println!();
    println!("{}", output::section_header("Options:"));
    println!("  -o <name>      Override the output binary stem");
    println!("  --release      Optimized build (-O2, no debug info)");
    println!("  --debug        Debug build (default, with -g)");
    println!("  --clean        Clean the main cache directory (module caches and binaries kept)");
    println!("  --ir           Print the entry module's IR and exit");
    println!("  --tokens       Print the token stream and exit");
    println!("  --ast          Print the AST and exit");
    println!("  -h, --help     Show this help message");
    println!();
    println!("{}", output::section_header("Output structure:"));
    println!("  .build/bin/    Executables (platform-specific extension)");
    println!("  .build/cache/  Entry object and per-module caches");
}
