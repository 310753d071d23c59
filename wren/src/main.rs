use clap::Parser as ClapParser;
use std::{
    io::{self, Write},
    path::PathBuf,
    process,
};

use wren::{Error, Options, VM};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Script files to run in order
    #[arg(required = false, help = "The .wren files to execute")]
    files: Vec<PathBuf>,

    #[arg(long, help = "Directory imports are resolved against")]
    modules_dir: Option<PathBuf>,

    /// Start REPL after running files (default if no files)
    #[arg(long, help = "Force REPL mode after file execution")]
    repl: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let modules_dir = cli.modules_dir.clone().or_else(|| {
        cli.files
            .first()
            .and_then(|file| file.parent())
            .map(|dir| dir.to_path_buf())
    });
    let mut vm = VM::with_options(Options { modules_dir });

    for file in &cli.files {
        log::debug!("running {}", file.display());
        if let Err(err) = vm.interpret_file(file) {
            // Compile and runtime details already went to stderr.
            if !matches!(err, Error::Compile | Error::Runtime(_)) {
                eprintln!("Error executing {}: {}", file.display(), err);
            }
            process::exit(1);
        }
    }

    if cli.repl || cli.files.is_empty() {
        run_repl(&mut vm);
    }
}

fn run_repl(vm: &mut VM) {
    println!("Wren REPL");
    println!("Type 'exit' to quit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        print!("> ");
        if let Err(err) = stdout.flush() {
            eprintln!("Error flushing stdout: {}", err);
            break;
        }

        input_buffer.clear();
        match stdin.read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                let input = input_buffer.trim();
                if input == "exit" {
                    break;
                }
                if input.is_empty() {
                    continue;
                }
                if let Err(err) = vm.interpret(input) {
                    if !matches!(err, Error::Compile | Error::Runtime(_)) {
                        eprintln!("Error: {}", err);
                    }
                }
            }
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                break;
            }
        }
    }
}
