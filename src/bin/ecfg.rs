//! ecfg CLI — manage encrypted secrets in JSON, YAML, and TOML files.
//!
//! Usage:
//!   ecfg encrypt [-t json|yaml|toml] [FILE]
//!   ecfg decrypt [-t json|yaml|toml] [-o OUTFILE] [FILE]
//!   ecfg keygen [-w KEYDIR]
//!
//! A global `-k`/`--keydir KEYDIR` (or `ECFG_KEYDIR`) selects the directory
//! decrypt searches for private keys; it defaults to `/opt/ecfg/keys`. When
//! FILE is omitted, encrypt/decrypt read stdin and write stdout.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use ecfg::keypair::Keypair;
use ecfg::keys;
use ecfg::orchestrator::{self, FileType};

const DEFAULT_KEYDIR: &str = "/opt/ecfg/keys";

fn usage() -> ! {
    eprintln!(
        "ecfg — manage encrypted secrets in JSON, YAML, and TOML files\n\
         \n\
         Usage:\n\
         \n\
         \x20 ecfg [-k KEYDIR] encrypt [-t TYPE] [FILE]\n\
         \x20 ecfg [-k KEYDIR] decrypt [-t TYPE] [-o OUTFILE] [FILE]\n\
         \x20 ecfg [-k KEYDIR] keygen [-w]\n\
         \n\
         TYPE is one of json, yaml, toml; inferred from FILE's extension\n\
         when omitted. With no FILE, encrypt/decrypt read stdin and write\n\
         stdout. -w writes the generated keypair into KEYDIR instead of\n\
         printing it.\n\
         \n\
         KEYDIR defaults to the ECFG_KEYDIR environment variable, or {DEFAULT_KEYDIR}.\n"
    );
    process::exit(1);
}

fn die(msg: impl std::fmt::Display) -> ! {
    eprintln!("ecfg: {msg}");
    process::exit(1);
}

struct Args {
    keydir: Option<String>,
    command: String,
    file_type: Option<String>,
    out_file: Option<String>,
    write_keydir: bool,
    path: Option<String>,
}

fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() {
        usage();
    }

    let mut keydir = None;
    let mut command = None;
    let mut file_type = None;
    let mut out_file = None;
    let mut write_keydir = false;
    let mut path = None;

    let mut i = 0;
    while i < argv.len() {
        let arg = argv[i].as_str();
        match arg {
            "-k" | "--keydir" => {
                i += 1;
                keydir = Some(argv.get(i).unwrap_or_else(|| die("-k requires an argument")).clone());
            }
            "-t" | "--type" => {
                i += 1;
                file_type = Some(argv.get(i).unwrap_or_else(|| die("-t requires an argument")).clone());
            }
            "-o" | "--output" => {
                i += 1;
                out_file = Some(argv.get(i).unwrap_or_else(|| die("-o requires an argument")).clone());
            }
            "-w" | "--write" => {
                write_keydir = true;
            }
            _ if command.is_none() => {
                command = Some(arg.to_string());
            }
            _ if path.is_none() => {
                path = Some(arg.to_string());
            }
            other => die(format!("unexpected argument: {other}")),
        }
        i += 1;
    }

    let command = command.unwrap_or_else(|| usage());
    Args {
        keydir,
        command,
        file_type,
        out_file,
        write_keydir,
        path,
    }
}

fn resolve_file_type(explicit: Option<&str>, path: Option<&str>) -> FileType {
    if let Some(name) = explicit {
        return FileType::from_name(name).unwrap_or_else(|| die(format!("unknown -t type: {name}")));
    }
    match path.and_then(FileType::infer) {
        Some(ft) => ft,
        None => die("cannot determine file type: pass -t json|yaml|toml or use a recognized extension"),
    }
}

fn read_input(path: Option<&str>) -> Vec<u8> {
    match path {
        Some(p) => std::fs::read(p).unwrap_or_else(|e| die(format!("read {p}: {e}"))),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).unwrap_or_else(|e| die(format!("read stdin: {e}")));
            buf
        }
    }
}

fn write_output(path: Option<&str>, data: &[u8]) {
    match path {
        Some(p) => std::fs::write(p, data).unwrap_or_else(|e| die(format!("write {p}: {e}"))),
        None => {
            io::stdout().write_all(data).unwrap_or_else(|e| die(format!("write stdout: {e}")));
        }
    }
}

fn cmd_encrypt(args: &Args) {
    let file_type = resolve_file_type(args.file_type.as_deref(), args.path.as_deref());

    match &args.path {
        Some(p) => {
            let written = orchestrator::encrypt_file_in_place(&PathBuf::from(p), file_type)
                .unwrap_or_else(|e| die(e));
            eprintln!("wrote {written} bytes to {p}");
        }
        None => {
            let data = read_input(None);
            let out = orchestrator::encrypt_data(&data, file_type).unwrap_or_else(|e| die(e));
            write_output(None, &out);
        }
    }
}

fn cmd_decrypt(args: &Args) {
    let file_type = resolve_file_type(args.file_type.as_deref(), args.path.as_deref());
    let data = read_input(args.path.as_deref());

    let plaintext =
        orchestrator::decrypt_data(&data, file_type, args.keydir.as_deref()).unwrap_or_else(|e| die(e));
    write_output(args.out_file.as_deref(), &plaintext);
}

fn cmd_keygen(args: &Args) {
    let kp = Keypair::generate();

    if args.write_keydir {
        let dir = args
            .keydir
            .clone()
            .or_else(|| std::env::var(keys::ENV_KEYDIR).ok())
            .unwrap_or_else(|| DEFAULT_KEYDIR.to_string());
        keys::write_to_keydir(std::path::Path::new(&dir), kp.public, &kp.private_hex())
            .unwrap_or_else(|e| die(e));
        println!("Public Key: {}", kp.public_hex());
        eprintln!("wrote private key to {}/{}", dir, kp.public_hex());
    } else {
        println!("Public Key:\n{}\n", kp.public_hex());
        println!("Private Key:\n{}", kp.private_hex());
    }
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(io::stderr).init();
}

fn main() {
    init_logging();
    let args = parse_args();

    match args.command.as_str() {
        "encrypt" | "e" => cmd_encrypt(&args),
        "decrypt" | "d" => cmd_decrypt(&args),
        "keygen" | "g" => cmd_keygen(&args),
        other => {
            eprintln!("unknown command: {other}");
            usage();
        }
    }
}
