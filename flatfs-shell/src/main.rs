//! The `mfs>` shell: one command per line, up to five whitespace-delimited
//! tokens, one storage-engine operation per command. Every error is reported
//! at the command boundary and the loop keeps going; only `quit`/`exit`
//! leave, with status 0.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, LocalResult, TimeZone};
use clap::Parser;
use log::debug;

use flatfs::FlatFs;

/// The original line parser keeps at most five tokens.
const MAX_TOKENS: usize = 5;

#[derive(Parser)]
#[command(name = "mfs", about = "Interactive shell for flatfs volume images")]
struct Cli {
    /// Volume image to open before entering the command loop.
    image: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut fs: Option<FlatFs> = None;
    if let Some(path) = cli.image {
        open_image(&mut fs, &path);
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("mfs> ");
        let _ = io::stdout().flush();

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF behaves like quit
            Ok(_) => (),
            Err(e) => {
                eprintln!("mfs> input error: {}", e);
                break;
            }
        }

        let tokens: Vec<&str> = line.split_whitespace().take(MAX_TOKENS).collect();
        let Some(&cmd) = tokens.first() else {
            continue;
        };
        debug!("dispatching {:?}", tokens);

        match cmd {
            "quit" | "exit" => break,
            "createfs" => {
                let Some(&name) = tokens.get(1) else {
                    missing_argument("createfs");
                    continue;
                };
                if let Err(e) = FlatFs::format(Path::new(name)) {
                    report("createfs", &e);
                }
            }
            "open" => {
                let Some(&name) = tokens.get(1) else {
                    missing_argument("open");
                    continue;
                };
                // Opening over an already-bound image silently replaces the
                // binding; the old in-memory state is discarded unpersisted.
                open_image(&mut fs, Path::new(name));
            }
            "close" => match fs.take() {
                Some(vol) => {
                    if let Err(e) = vol.close() {
                        report("close", &e);
                    }
                }
                None => println!("mfs> close error: no open file system to close"),
            },
            "put" => {
                let Some(&name) = tokens.get(1) else {
                    missing_argument("put");
                    continue;
                };
                let Some(vol) = fs.as_mut() else {
                    no_open_image("put");
                    continue;
                };
                if let Err(e) = vol.put(Path::new(name)) {
                    report("put", &e);
                }
            }
            "get" => {
                let Some(&name) = tokens.get(1) else {
                    missing_argument("get");
                    continue;
                };
                let Some(vol) = fs.as_ref() else {
                    no_open_image("get");
                    continue;
                };
                if let Err(e) = vol.get(name, tokens.get(2).copied()) {
                    report("get", &e);
                }
            }
            "del" => {
                let Some(&name) = tokens.get(1) else {
                    missing_argument("del");
                    continue;
                };
                let Some(vol) = fs.as_mut() else {
                    no_open_image("del");
                    continue;
                };
                if let Err(e) = vol.del(name) {
                    report("del", &e);
                }
            }
            "attrib" => {
                let (Some(&op), Some(&name)) = (tokens.get(1), tokens.get(2)) else {
                    missing_argument("attrib");
                    continue;
                };
                let Some(vol) = fs.as_mut() else {
                    no_open_image("attrib");
                    continue;
                };
                if let Err(e) = vol.attrib(op, name) {
                    report("attrib", &e);
                }
            }
            "list" => {
                let show_hidden = match tokens.get(1) {
                    None => false,
                    Some(&"-h") | Some(&"-H") => true,
                    Some(flag) => {
                        println!("mfs> list error: unrecognized flag: {}", flag);
                        continue;
                    }
                };
                let Some(vol) = fs.as_ref() else {
                    no_open_image("list");
                    continue;
                };
                let entries = vol.list(show_hidden);
                if entries.is_empty() {
                    println!("mfs> list: no files found");
                } else {
                    for e in entries {
                        println!("{:>8}  {:>24}  {}", e.size, format_time(e.created), e.name);
                    }
                }
            }
            "df" => {
                let Some(vol) = fs.as_ref() else {
                    no_open_image("df");
                    continue;
                };
                println!("{} bytes free.", vol.free_bytes());
            }
            _ => println!("mfs> command not found: {}", cmd),
        }
    }

    // Falling out of the loop means quit/exit/EOF: persist anything bound.
    if let Some(vol) = fs.take() {
        if let Err(e) = vol.close() {
            report("close", &e);
        }
    }
}

fn open_image(fs: &mut Option<FlatFs>, path: &Path) {
    match FlatFs::open(path) {
        Ok(vol) => *fs = Some(vol),
        Err(e) => report("open", &e),
    }
}

fn report(cmd: &str, err: &flatfs::FsError) {
    println!("mfs> {} error: {}", cmd, err);
}

fn missing_argument(cmd: &str) {
    println!("mfs> {} error: missing argument", cmd);
}

fn no_open_image(cmd: &str) {
    println!("mfs> {} error: no file system image is open", cmd);
}

fn format_time(epoch_secs: i64) -> String {
    match Local.timestamp_opt(epoch_secs, 0) {
        LocalResult::Single(t) => t.format("%a %b %e %H:%M:%S %Y").to_string(),
        _ => epoch_secs.to_string(),
    }
}
