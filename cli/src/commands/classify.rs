use std::fmt::Display;

use mealsense_core::classify;

use crate::util::{exit_error, print_json, read_json_from_file};

/// Classify a saved backend response (file or stdin) and print the record.
pub fn run(path: &str, failure: Option<&str>) -> i32 {
    let response = match read_json_from_file(path) {
        Ok(v) => v,
        Err(e) => exit_error(&e, Some("Pass a JSON file path or '-' to read stdin.")),
    };
    let failure = failure.as_ref().map(|f| f as &dyn Display);
    print_json(&classify(&response, failure))
}
