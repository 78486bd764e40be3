use relay_codec::ForwardPayload;
use relay_types::models::CatalogRow;

/// One catalog row on its way to subscribers. Lives for a single dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationJob {
    pub source_table: String,
    pub row: CatalogRow,
    pub payload: ForwardPayload,
}

impl NotificationJob {
    /// `None` when the row has no redeemable source link; such rows are not
    /// notifiable.
    pub fn new(source_table: &str, row: CatalogRow) -> Option<Self> {
        let payload = ForwardPayload::from_link(row.link.as_deref()?)?;
        Some(Self {
            source_table: source_table.to_string(),
            row,
            payload,
        })
    }
}
