// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn db_path_arg() -> Arg {
    Arg::new("db_path")
        .short('d')
        .long("db-path")
        .value_name("PATH")
        .default_value("/var/lib/yumsync/history.db")
        .help("Database path")
}

fn build_cli() -> Command {
    Command::new("yumsync")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Yumsync Contributors")
        .about("Incremental mirroring of RPM/YUM repository metadata")
        .subcommand_required(false)
        .subcommand(
            Command::new("init")
                .about("Initialize the sync history database")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("sync")
                .about("Sync repository metadata for the mirrors defined in a Yumfile")
                .arg(
                    Arg::new("yumfile")
                        .short('f')
                        .long("yumfile")
                        .value_name("PATH")
                        .default_value("Yumfile")
                        .help("Path to the Yumfile"),
                )
                .arg(
                    Arg::new("repo")
                        .short('r')
                        .long("repo")
                        .value_name("ID")
                        .action(ArgAction::Append)
                        .help("Only sync these repository ids (all enabled mirrors if omitted)"),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .value_name("N")
                        .default_value("4")
                        .help("Number of database files fetched concurrently per repository"),
                )
                .arg(
                    Arg::new("prune")
                        .long("prune")
                        .action(ArgAction::SetTrue)
                        .help("Delete files of database entries the remote no longer lists"),
                )
                .arg(
                    Arg::new("db_path")
                        .short('d')
                        .long("db-path")
                        .value_name("PATH")
                        .help("Record each attempt in this history database"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Print the entries of a repomd.xml file")
                .arg(Arg::new("path").required(true).help("Path to a repomd.xml file")),
        )
        .subcommand(
            Command::new("history")
                .about("Show sync history")
                .arg(
                    Arg::new("repo")
                        .short('r')
                        .long("repo")
                        .value_name("ID")
                        .help("Only show this repository id"),
                )
                .arg(db_path_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("yumsync.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
