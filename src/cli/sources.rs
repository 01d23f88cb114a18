use super::ui;
use crate::core::SourceRegistry;
use crate::sources::SourceAdapters;
use comfy_table::{Cell, CellAlignment};

pub fn render(registry: &SourceRegistry, adapters: &SourceAdapters) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Name"),
        ui::header_cell("Type"),
        ui::header_cell("Default weight"),
        ui::header_cell("Off-chain adapter"),
    ]);

    for descriptor in registry.list() {
        table.add_row(vec![
            Cell::new(descriptor.id),
            Cell::new(descriptor.display_name),
            Cell::new(descriptor.kind.to_string()),
            Cell::new(format!("{:.2}", descriptor.default_weight))
                .set_alignment(CellAlignment::Right),
            ui::flag_cell(adapters.supports(descriptor.id)),
        ]);
    }

    format!(
        "{}\n\n{}",
        ui::style_text("Available sources", ui::StyleType::Title),
        table
    )
}

pub fn run(registry: &SourceRegistry, adapters: &SourceAdapters) {
    println!("{}", render(registry, adapters));
}
