use crate::config::AppConfig;
use crate::services::ai::CompletionProvider;
use crate::services::store::BookingStore;

pub struct AppState {
    pub store: BookingStore,
    pub config: AppConfig,
    pub llm: Box<dyn CompletionProvider>,
}
