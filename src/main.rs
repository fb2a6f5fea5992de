extern crate log;
extern crate pretty_env_logger;

use std::path::Path;
use std::process::exit;

use clap::{arg, command, Command};

use crate::config::{load_config, DetectorConfig};
use crate::debug::load_font;
use crate::interpret::{interpret_sheet_file, InterpretOptions};
use crate::report::render_text;
use crate::template::{load_template, SheetTemplate};

mod bubbles;
mod config;
mod debug;
mod geometry;
mod grid;
mod image_utils;
mod interpret;
mod lines;
mod report;
mod scoring;
mod template;
#[cfg(test)]
mod test_utils;
mod types;

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let matches = cli().get_matches();
    let debug = matches.get_flag("debug");
    let json = matches.get_flag("json");
    let Some(image_path) = matches.get_one::<String>("image_path") else {
        eprintln!("Error: an image path is required");
        exit(1);
    };

    let template = match matches.get_one::<String>("template") {
        Some(path) => load_template(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            exit(1);
        }),
        None => SheetTemplate::default(),
    };

    let config = match matches.get_one::<String>("config") {
        Some(path) => load_config(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            exit(1);
        }),
        None => DetectorConfig::default(),
    };

    let font = matches.get_one::<String>("font").map(|path| {
        load_font(Path::new(path)).unwrap_or_else(|| {
            eprintln!("Error loading font {}", path);
            exit(1);
        })
    });

    let options = InterpretOptions {
        debug,
        template,
        config,
        font,
    };

    match interpret_sheet_file(Path::new(image_path), &options) {
        Ok(report) if json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                exit(1);
            }
        },
        Ok(report) => print!("{}", render_text(&report, &options.template)),
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    }
}

fn cli() -> Command {
    command!()
        .arg(arg!(-t --template <PATH> "Path to a sheet template JSON file"))
        .arg(arg!(-c --config <PATH> "Path to a detector config JSON file"))
        .arg(arg!(-d --debug "Write annotated debug images next to the input"))
        .arg(arg!(--json "Print the report as JSON"))
        .arg(arg!(--font <PATH> "TrueType font used to label debug images"))
        .arg(arg!(image_path: <IMAGE> "Path to the scanned evaluation sheet").required(true))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cli_parses_options() {
        let matches = cli()
            .try_get_matches_from(["evalscan", "-d", "--json", "-t", "sheet.json", "scan.jpg"])
            .unwrap();
        assert!(matches.get_flag("debug"));
        assert!(matches.get_flag("json"));
        assert_eq!(
            matches.get_one::<String>("template").map(String::as_str),
            Some("sheet.json")
        );
        assert_eq!(matches.get_one::<String>("config"), None);
        assert_eq!(
            matches.get_one::<String>("image_path").map(String::as_str),
            Some("scan.jpg")
        );
    }

    #[test]
    fn cli_requires_image() {
        assert!(cli().try_get_matches_from(["evalscan", "--json"]).is_err());
    }
}
