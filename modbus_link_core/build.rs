use std::fs;

fn main() {
    // The exception code table is embedded with include_str!; reject a broken
    // table here instead of at the first registry load.
    println!("cargo:rerun-if-changed=src/exception_codes.toml");
    let src = fs::read_to_string("src/exception_codes.toml")
        .unwrap_or_else(|e| panic!("read src/exception_codes.toml: {e}"));
    let parsed: toml::Table = src
        .parse()
        .unwrap_or_else(|e| panic!("src/exception_codes.toml parse error: {e}"));
    match parsed.get("codes") {
        Some(toml::Value::Array(codes)) if !codes.is_empty() => {}
        _ => panic!("src/exception_codes.toml must define a non-empty [[codes]] array"),
    }
}
