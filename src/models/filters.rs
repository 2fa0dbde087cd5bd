#[derive(Debug, Default)]
pub struct InventoryFilter {
    /// Case-insensitive substring match on name or generic name.
    pub search: Option<String>,
    pub category: Option<String>,
    pub form: Option<String>,
    pub in_stock_only: bool,
}
