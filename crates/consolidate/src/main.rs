use anyhow::{anyhow, Result};
use consolidate::{load_mapping_config, priority_counts, unify, SourceTable};
use std::env;
use utils::{read_table_csv, write_table_csv};

fn main() -> Result<()> {
    // Usage:
    //   consolidate --sciencedirect sd.csv --scopus scopus.csv --webofscience wos.csv
    //               [--config column_mapping.json] [--output consolidated_output.csv]
    //               [--no-source-column]
    //
    // Merges the three database exports into one CSV using the column
    // mapping configuration. Short flags: -sd, -sc, -wos, -c, -o.

    let args: Vec<String> = env::args().collect();

    let mut sciencedirect: Option<String> = None;
    let mut scopus: Option<String> = None;
    let mut webofscience: Option<String> = None;
    let mut config = "column_mapping.json".to_string();
    let mut output = "consolidated_output.csv".to_string();
    let mut source_column = true;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--sciencedirect" | "-sd" => sciencedirect = Some(take_value(&args, &mut i, arg)?),
            "--scopus" | "-sc" => scopus = Some(take_value(&args, &mut i, arg)?),
            "--webofscience" | "-wos" => webofscience = Some(take_value(&args, &mut i, arg)?),
            "--config" | "-c" => config = take_value(&args, &mut i, arg)?,
            "--output" | "-o" => output = take_value(&args, &mut i, arg)?,
            "--no-source-column" => {
                source_column = false;
                i += 1;
            }
            other => return Err(anyhow!("Unknown argument: {}", other)),
        }
    }

    let (Some(sciencedirect), Some(scopus), Some(webofscience)) =
        (sciencedirect, scopus, webofscience)
    else {
        println!("❌ Missing input files.");
        println!("   Required: --sciencedirect <csv> --scopus <csv> --webofscience <csv>");
        println!("   Optional: --config <json> --output <csv> --no-source-column");
        return Err(anyhow!("--sciencedirect, --scopus and --webofscience are required"));
    };

    let mapping = load_mapping_config(&config)?;

    println!("📖 Loading database files...");
    let sd_table = read_table_csv(&sciencedirect)?;
    let scopus_table = read_table_csv(&scopus)?;
    let wos_table = read_table_csv(&webofscience)?;

    println!("  ✓ ScienceDirect: {} records", sd_table.len());
    println!("  ✓ Scopus: {} records", scopus_table.len());
    println!("  ✓ Web of Science: {} records", wos_table.len());

    let sources = [
        SourceTable::new("sciencedirect", "ScienceDirect", sd_table),
        SourceTable::new("scopus", "Scopus", scopus_table),
        SourceTable::new("webofscience", "Web of Science", wos_table),
    ];

    println!("\nMapping columns to unified schema...");
    let consolidated = unify(&sources, &mapping, source_column)?;

    write_table_csv(&output, &consolidated)?;

    println!("\n✓ Consolidated {} records", consolidated.len());
    println!("Output file: {}", output);
    println!("Total columns: {}", consolidated.columns.len());

    println!("\nColumn priority summary:");
    for (priority, count) in priority_counts(&mapping) {
        let label = match priority {
            1 => " (in all 3 sources)",
            2 => " (in 2 sources)",
            3 => " (in 1 source)",
            _ => "",
        };
        println!("  Priority {}{}: {} columns", priority, label, count);
    }

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
