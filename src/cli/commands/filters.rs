//! Filter listing command.

use console::style;

use crate::models::FilterKey;
use crate::search::filters::token_table;

/// Print every filter name with its accepted values.
pub fn cmd_filters() -> anyhow::Result<()> {
    println!("\n{}", style("Search Filters").bold());
    println!("{}", "-".repeat(60));

    for key in FilterKey::ALL {
        let values = match token_table(key) {
            Some(table) => table
                .iter()
                .map(|(value, _)| *value)
                .collect::<Vec<_>>()
                .join(", "),
            None => match key {
                FilterKey::ExactSize => "WIDTH,HEIGHT".to_string(),
                FilterKey::TimeRange => "MM/DD/YYYY,MM/DD/YYYY".to_string(),
                _ => "domain name".to_string(),
            },
        };
        println!("{:<14} {}", style(key.as_str()).cyan(), values);
        if key == FilterKey::Language {
            println!("{:<14} {}", "", style("(lang_xx codes such as lang_fr are also accepted)").dim());
        }
    }

    Ok(())
}
