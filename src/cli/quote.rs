use super::ui;
use crate::core::{QuoteResponse, QuoteService};
use comfy_table::Cell;

pub fn render(response: &QuoteResponse, requested: &[String]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Price (USD)"),
        ui::header_cell("24h"),
        ui::header_cell("Last updated"),
    ]);

    for symbol in requested {
        let key = symbol.trim().to_uppercase();
        match response.prices.get(&key) {
            Some(quote) => table.add_row(vec![
                Cell::new(&key),
                ui::format_optional_cell(Some(quote.price), |p| format!("{p:.4}")),
                quote.change_24h.map_or_else(|| ui::na_cell(false), ui::change_cell),
                Cell::new(quote.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            ]),
            None => table.add_row(vec![
                Cell::new(&key),
                Cell::new(ui::style_text("unavailable", ui::StyleType::Error)),
                Cell::new(""),
                Cell::new(""),
            ]),
        };
    }

    let mut output = table.to_string();
    if let Some(strategy) = response.strategy {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(&format!("Strategy hint: {strategy}"), ui::StyleType::Subtle)
        ));
    }
    output
}

pub async fn run(service: &dyn QuoteService, symbols: &[String]) {
    let pb = ui::new_spinner("Fetching quotes...");
    let response = service.quotes(symbols, None).await;
    pb.finish_and_clear();
    println!("{}", render(&response, symbols));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Quote, Strategy};
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn test_missing_symbols_are_marked() {
        let mut prices = HashMap::new();
        prices.insert(
            "BTC/USD".to_string(),
            Quote {
                price: 64000.0,
                change_24h: Some(-1.5),
                last_updated: Utc::now(),
            },
        );
        let response = QuoteResponse {
            prices,
            strategy: Some(Strategy::Median),
            timestamp: Utc::now(),
        };

        let output = render(&response, &["btc/usd".to_string(), "NOPE/USD".to_string()]);
        assert!(output.contains("64000.0000"));
        assert!(output.contains("-1.50%"));
        assert!(output.contains("NOPE/USD"));
        assert!(output.contains("unavailable"));
        assert!(output.contains("Strategy hint: median"));
    }
}
