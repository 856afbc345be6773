use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("distill")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Distill Contributors")
        .about("Distill web pages and PDFs into simplified documents")
        .arg(clap::arg!(<URL> "URL to distill (HTML page or PDF)"))
        .arg(
            clap::arg!(-c --complexity <LEVEL> "Target audience complexity")
                .value_name("LEVEL")
                .default_value("beginner")
                .value_parser(["beginner", "intermediate"]),
        )
        .arg(clap::arg!(--no_stream "Wait for the full result instead of streaming tokens"))
        .arg(clap::arg!(--extract_only "Only extract and print the readable content"))
        .arg(
            clap::arg!(-o --output <FILE> "Output file (default: stdout)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            clap::arg!(--config_dir <DIR> "Base directory containing config/ and prompts/")
                .value_name("DIR")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--models "List model backends and their key/enabled status"))
        .arg(clap::arg!(-v --verbose "Enable debug logging"));

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "distill", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "distill", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "distill", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "distill", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
