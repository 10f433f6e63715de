use crate::application::create_entry::CreateEntryHandler;
use crate::application::publisher::Publisher;
use crate::application::reader::CatalogReader;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub create_handler: Arc<CreateEntryHandler>,
    pub reader: CatalogReader,
    pub publisher: Arc<Publisher>,
}
