use anyhow::{anyhow, Result};
use deduplicate::{deduplicate, Strategy, DEFAULT_ID_COLUMN};
use std::env;
use utils::{read_table_csv, write_table_csv};

fn main() -> Result<()> {
    // Usage:
    //   deduplicate --input consolidated.csv [--output no_duplicates_consolidated.csv]
    //               [--strategy most_complete|first|last] [--no-merge-sources]
    //               [--doi-column DOI]
    //
    // Removes rows that share a DOI, keeping one representative per group.
    // Short flags: -i, -o, -s, -d.

    let args: Vec<String> = env::args().collect();

    let mut input: Option<String> = None;
    let mut output = "no_duplicates_consolidated.csv".to_string();
    let mut strategy_name = "most_complete".to_string();
    let mut merge_sources = true;
    let mut doi_column = DEFAULT_ID_COLUMN.to_string();

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--input" | "-i" => input = Some(take_value(&args, &mut i, arg)?),
            "--output" | "-o" => output = take_value(&args, &mut i, arg)?,
            "--strategy" | "-s" => strategy_name = take_value(&args, &mut i, arg)?,
            "--no-merge-sources" => {
                merge_sources = false;
                i += 1;
            }
            "--doi-column" | "-d" => doi_column = take_value(&args, &mut i, arg)?,
            other => return Err(anyhow!("Unknown argument: {}", other)),
        }
    }

    let Some(input) = input else {
        println!("❌ Missing input file.");
        println!("   Required: --input <csv>");
        println!("   Optional: --output <csv> --strategy <name> --no-merge-sources --doi-column <name>");
        return Err(anyhow!("--input is required"));
    };

    let strategy = Strategy::parse(&strategy_name)?;

    println!("📖 Loading {}...", input);
    let table = read_table_csv(&input)?;
    println!("Initial record count: {}", table.len());

    let (deduplicated, report) = deduplicate(&table, &doi_column, strategy, merge_sources)?;

    if report.rows_without_id > 0 {
        println!(
            "⚠️ {} records have no {} and cannot be checked for duplicates",
            report.rows_without_id, doi_column
        );
    }

    println!("\nDuplicate analysis:");
    println!("  Duplicate groups: {}", report.duplicate_groups);
    println!("  Records removed: {}", report.rows_removed);

    if !report.samples.is_empty() {
        println!("\nExample duplicates found:");
        for sample in &report.samples {
            println!("\n  {}: {}", doi_column, sample.identifier);
            if !sample.sources.is_empty() {
                println!("    Found in: {}", sample.sources.join(", "));
            }
            if let Some(title) = &sample.title {
                println!("    Title: {}", shorten(title, 60));
            }
        }
    }

    if !report.has_duplicates() {
        println!("\nNo duplicates found. Saving records unchanged...");
    } else {
        println!("\nApplied deduplication strategy: {}", strategy_name);
    }

    write_table_csv(&output, &deduplicated)?;

    println!("\n✓ Deduplication complete:");
    println!("  Records removed: {}", report.rows_removed);
    println!("  Final record count: {}", report.final_rows);
    println!("\nOutput saved to: {}", output);

    Ok(())
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    let value = args
        .get(*i + 1)
        .ok_or_else(|| anyhow!("Missing value for {}", flag))?
        .clone();
    *i += 2;
    Ok(value)
}
