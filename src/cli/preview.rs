use super::ui;
use crate::core::aggregator::deployment_readiness;
use crate::core::{FeedConfiguration, Sample};
use crate::refresh::{PreviewSnapshot, RefreshScheduler};
use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment};

pub fn render(config: &FeedConfiguration, snapshot: &PreviewSnapshot) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Source"),
        ui::header_cell("Type"),
        ui::header_cell("Weight"),
        ui::header_cell("Status"),
        ui::header_cell("Price"),
    ]);

    for binding in config.enabled_sources() {
        let sample: Option<&Sample> = snapshot.samples.get(&binding.id);
        let (status, price) = match sample {
            Some(s) => (
                ui::status_cell(s.is_active()),
                if s.is_active() {
                    ui::format_optional_cell(Some(s.price), |p| {
                        ui::format_price(p, config.decimals)
                    })
                } else {
                    ui::na_cell(true)
                },
            ),
            None => (
                Cell::new(ui::style_text("no adapter", ui::StyleType::Subtle)),
                ui::na_cell(false),
            ),
        };
        table.add_row(vec![
            Cell::new(&binding.name),
            Cell::new(binding.kind.to_string()),
            Cell::new(format!("{:.2}", binding.weight)).set_alignment(CellAlignment::Right),
            status,
            price,
        ]);
    }

    let mut output = format!(
        "Feed: {} ({})\n",
        ui::style_text(&config.name, ui::StyleType::Title),
        config.symbol
    );
    if let Some(quote) = &snapshot.quote {
        let change = quote
            .change_24h
            .map_or_else(String::new, |c| format!(" ({c:+.2}% 24h)"));
        output.push_str(&format!(
            "{}\n",
            ui::style_text(
                &format!("Market: {:.4}{change}", quote.price),
                ui::StyleType::Subtle
            )
        ));
    }
    output.push('\n');
    output.push_str(&table.to_string());

    let (value, value_style) = match snapshot.aggregated {
        Some(v) => (ui::format_price(v, config.decimals), ui::StyleType::TotalValue),
        None => ("N/A".to_string(), ui::StyleType::Error),
    };
    output.push_str(&format!(
        "\n\nAggregated ({}): {}",
        ui::style_text(&config.aggregator.strategy.to_string(), ui::StyleType::TotalLabel),
        ui::style_text(&value, value_style)
    ));

    let readiness = deployment_readiness(config, &snapshot.samples);
    let sources_line = format!(
        "{}/{} active sources (min {})",
        readiness.active_sources,
        config.enabled_sources().count(),
        readiness.min_sources
    );
    let deviation_line = match readiness.max_deviation {
        Some(d) => format!(
            "max deviation {:.2}% (threshold {:.2}%)",
            d * 100.0,
            readiness.deviation_threshold * 100.0
        ),
        None => "max deviation N/A".to_string(),
    };
    let readiness_style = if readiness.is_ready() {
        ui::StyleType::TotalValue
    } else {
        ui::StyleType::Warning
    };
    output.push_str(&format!(
        "\n{}: {sources_line}, {deviation_line}",
        ui::style_text(
            if readiness.is_ready() { "Ready" } else { "Not ready" },
            readiness_style
        )
    ));

    if let Some(at) = snapshot.last_update {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                &format!("Updated {}", at.format("%H:%M:%S UTC")),
                ui::StyleType::Subtle
            )
        ));
    }
    output
}

/// Runs a single fetch cycle for `config` and prints the result.
pub async fn run(mut scheduler: RefreshScheduler, config: FeedConfiguration) -> Result<()> {
    let mut rx = scheduler.subscribe();
    let pb = ui::new_spinner(&format!("Fetching {} from sources...", config.symbol));

    scheduler.set_configuration(config.clone()).await;
    let snapshot = rx
        .wait_for(|s| s.cycle > 0 && !s.loading)
        .await
        .context("Refresh scheduler stopped before the first cycle")?
        .clone();
    scheduler.shutdown();
    pb.finish_and_clear();

    println!("{}", render(&config, &snapshot));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::SourceRegistry;
    use std::collections::HashMap;

    fn snapshot(samples: &[(&str, Sample)], aggregated: Option<f64>) -> PreviewSnapshot {
        PreviewSnapshot {
            symbol: "BTC/USD".to_string(),
            samples: samples
                .iter()
                .map(|(id, s)| (id.to_string(), s.clone()))
                .collect::<HashMap<_, _>>(),
            aggregated,
            cycle: 1,
            ..Default::default()
        }
    }

    fn config() -> FeedConfiguration {
        FeedConfiguration {
            sources: SourceRegistry::builtin().default_bindings(),
            decimals: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_shows_sources_and_value() {
        let output = render(
            &config(),
            &snapshot(
                &[
                    ("coingecko", Sample::active(100.0)),
                    ("binance", Sample::active(102.0)),
                    ("coinbase", Sample::error()),
                ],
                Some(101.0),
            ),
        );

        assert!(output.contains("BTC/USD Feed"));
        assert!(output.contains("CoinGecko"));
        assert!(output.contains("102.00"));
        assert!(output.contains("error"));
        assert!(output.contains("101.00"));
        assert!(output.contains("2/3 active sources (min 1)"));
        assert!(output.contains("Ready"));
    }

    #[test]
    fn test_render_without_value() {
        let output = render(&config(), &snapshot(&[], None));
        assert!(output.contains("N/A"));
        assert!(output.contains("Not ready"));
        assert!(output.contains("no adapter"));
    }
}
