//! Build script: generate `supervisord`'s manual page into
//! `target/generated-man/<target>/<profile>` for release packaging.
//!
//! Grounded on `weaver-cli/build.rs`: render the `clap::Command` derived
//! from [`cli::Cli`] through `clap_mangen`, stamped with the
//! `SOURCE_DATE_EPOCH`-derived date `daemon_build_util` computes.

use std::{env, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn is_cross_compiling() -> bool {
    let target = env::var("TARGET").ok();
    let host = env::var("HOST").ok();
    target.is_some() && host.is_some() && target != host
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=CARGO_PKG_VERSION");
    println!("cargo:rerun-if-env-changed=CARGO_PKG_NAME");
    println!("cargo:rerun-if-env-changed=CARGO_BIN_NAME");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-env-changed=TARGET");
    println!("cargo:rerun-if-env-changed=HOST");
    println!("cargo:rerun-if-env-changed=PROFILE");

    if is_cross_compiling() {
        println!("cargo:warning=Skipping man page generation during cross-compilation");
        return Ok(());
    }

    let cmd = cli::Cli::command();
    let name = cmd.get_bin_name().unwrap_or_else(|| cmd.get_name()).to_owned();
    let cargo_bin = env::var("CARGO_BIN_NAME")
        .or_else(|_| env::var("CARGO_PKG_NAME"))
        .unwrap_or_else(|_| name.clone());
    let version = env::var("CARGO_PKG_VERSION")
        .map_err(|_| "CARGO_PKG_VERSION must be set by Cargo; cannot render manual page without it.")?;

    let mut warnings = Vec::new();
    let date = daemon_build_util::manual_date_from_env(&mut warnings);
    for warning in &warnings {
        println!("cargo:warning={warning}");
    }

    let man = Man::new(cmd).section("1").source(format!("{cargo_bin} {version}")).date(date);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    let page_name = format!("{cargo_bin}.1");

    let out_dir_env = env::var_os("OUT_DIR").map(PathBuf::from);
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown-target".into());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown-profile".into());
    let generated_dir =
        daemon_build_util::out_dir_for_target_profile(&target, &profile, out_dir_env.as_deref());
    daemon_build_util::write_man_page(&buf, &generated_dir, &page_name)?;

    if let Some(extra_dir) = out_dir_env {
        if let Err(error) = daemon_build_util::write_man_page(&buf, &extra_dir, &page_name) {
            println!(
                "cargo:warning=Failed to stage manual page in OUT_DIR ({}): {error}",
                extra_dir.display()
            );
        }
    }

    Ok(())
}
