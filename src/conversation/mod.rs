// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Concurrent conversation management
//!
//! Each in-flight question runs in its own worker task; updates flow
//! through per-conversation FIFO queues into the registry, drained by the
//! dispatcher from a single driving task. The registry is the only owner
//! of conversation state and is passed explicitly, never held in a global.

pub mod dispatcher;
pub mod registry;
pub mod state;
mod worker;

pub use dispatcher::{RedrawSignal, UpdateDispatcher};
pub use registry::{ConversationError, ConversationRegistry};
pub use state::{ChatMessage, Conversation, ConversationStatus, ConversationUpdate};
