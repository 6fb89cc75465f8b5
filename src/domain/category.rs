/// Fold a free-text category label into its canonical key.
///
/// Transactions and budgets are joined on this key, so every write path
/// must normalize before touching storage.
pub fn normalize_category(raw: &str) -> String {
    raw.trim().to_lowercase()
}
