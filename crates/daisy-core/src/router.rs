//! TypeAttributeRouter - routes on a message attribute naming its type.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::Message;
use crate::ports::{MessageHandler, MessageRouting};

pub const DEFAULT_MESSAGE_TYPE_ATTRIBUTE: &str = "daisy_message_type";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for message type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("missing message types: {0:?}. These types were expected but not registered.")]
    MissingTypes(Vec<String>),
}

/// Looks up the handler registered for the value of one message attribute.
///
/// Built once, then read concurrently by every worker without locks.
pub struct TypeAttributeRouter {
    attribute_name: String,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl TypeAttributeRouter {
    pub fn builder() -> TypeAttributeRouterBuilder {
        TypeAttributeRouterBuilder::new()
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl MessageRouting for TypeAttributeRouter {
    fn route(&self, message: &Message) -> Option<Arc<dyn MessageHandler>> {
        let Some(message_type) = message.attribute(&self.attribute_name) else {
            tracing::warn!(
                message_id = %message.message_id,
                attribute = %self.attribute_name,
                "message missing expected type attribute"
            );
            return None;
        };

        let handler = self.handlers.get(message_type).cloned();
        if handler.is_none() {
            tracing::warn!(
                message_id = %message.message_id,
                message_type,
                "no handler registered for message type"
            );
        }
        handler
    }
}

/// Builder for [`TypeAttributeRouter`].
///
/// # Fail-fast
/// - registering the same type twice is an error
/// - `expect_types` + `build` reports every expected type with no handler
pub struct TypeAttributeRouterBuilder {
    attribute_name: String,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    expected_types: Option<Vec<String>>,
}

impl TypeAttributeRouterBuilder {
    pub fn new() -> Self {
        Self {
            attribute_name: DEFAULT_MESSAGE_TYPE_ATTRIBUTE.to_string(),
            handlers: HashMap::new(),
            expected_types: None,
        }
    }

    pub fn attribute_name(mut self, name: impl Into<String>) -> Self {
        self.attribute_name = name.into();
        self
    }

    pub fn register(
        mut self,
        message_type: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, RegistryError> {
        let message_type = message_type.into();
        if self.handlers.contains_key(&message_type) {
            return Err(RegistryError::AlreadyRegistered(message_type));
        }
        self.handlers.insert(message_type, handler);
        Ok(self)
    }

    pub fn expect_types(mut self, message_types: &[&str]) -> Self {
        self.expected_types = Some(message_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<TypeAttributeRouter, RegistryError> {
        if let Some(expected) = &self.expected_types {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !self.handlers.contains_key(t.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(RegistryError::MissingTypes(missing));
            }
        }
        Ok(TypeAttributeRouter {
            attribute_name: self.attribute_name,
            handlers: self.handlers,
        })
    }
}

impl Default for TypeAttributeRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
