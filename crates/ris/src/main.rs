use anyhow::{anyhow, Context, Result};
use ris::{records_to_table, RisParser};
use std::env;
use std::fs;
use std::path::PathBuf;
use utils::write_table_csv;

fn main() -> Result<()> {
    // Usage:
    //   ris [--input ris] [--output output] [--filename exported]
    //
    // Converts every .ris file in the input folder into one CSV at
    // <output>/<filename>.csv. Short flags: -i, -o, -f.

    let args: Vec<String> = env::args().collect();

    let mut input = "ris".to_string();
    let mut output = "output".to_string();
    let mut filename = "exported".to_string();

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--input" | "-i" => input = take_value(&args, &mut i, arg)?,
            "--output" | "-o" => output = take_value(&args, &mut i, arg)?,
            "--filename" | "-f" => filename = take_value(&args, &mut i, arg)?,
            other => return Err(anyhow!("Unknown argument: {}", other)),
        }
    }

    let mut ris_files: Vec<PathBuf> = Vec::new();
    for entry in
        fs::read_dir(&input).with_context(|| format!("Cannot read input folder: {}", input))?
    {
        let path = entry?.path();
        let is_ris = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("ris"))
            .unwrap_or(false);
        if path.is_file() && is_ris {
            ris_files.push(path);
        }
    }
    ris_files.sort();

    if ris_files.is_empty() {
        println!("❌ No .ris files found in {}", input);
        return Ok(());
    }

    println!("📂 Found {} .ris file(s)", ris_files.len());

    let parser = RisParser::new();
    let mut all_records = Vec::new();
    for path in &ris_files {
        println!(
            "📖 Processing {}...",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("<unnamed>")
        );
        let records = parser.parse_file(path)?;
        all_records.extend(records);
    }

    println!("Total entries: {}", all_records.len());

    let table = records_to_table(all_records);
    let out_path = PathBuf::from(&output).join(format!("{}.csv", filename));
    write_table_csv(&out_path, &table)?;

    println!("✓ Exported to {}", out_path.display());

    Ok(())
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    let value = args
        .get(*i + 1)
        .ok_or_else(|| anyhow!("Missing value for {}", flag))?
        .clone();
    *i += 2;
    Ok(value)
}
