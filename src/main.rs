use std::process;

use bir::cli::{init_logging, parse_args, run};
use tracing::error;

fn main() {
    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(report) => {
            print!("{}", report.text);
            if !report.success {
                process::exit(1);
            }
        }
        Err(e) => {
            error!(code = e.diagnostic_code(), offset = ?e.byte_offset(), "command failed");
            eprintln!("error[{}]: {}", e.diagnostic_code(), e);
            process::exit(1);
        }
    }
}
