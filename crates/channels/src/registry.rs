use std::{collections::HashMap, sync::Arc};

use courier_common::ChannelType;

use crate::adapter::ChannelAdapter;

/// Registry of all loaded channel adapters, keyed by channel type.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChannelType, Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.channel_type(), adapter);
    }

    #[must_use]
    pub fn get(&self, channel_type: ChannelType) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&channel_type).map(Arc::clone)
    }

    #[must_use]
    pub fn list(&self) -> Vec<ChannelType> {
        self.adapters.keys().copied().collect()
    }
}
