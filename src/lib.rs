//! # ragchat
//!
//! Client library and terminal front end for a retrieval-augmented chat
//! service. The backend owns documents, conversations, tasks and users;
//! this crate talks to its REST/SSE API, keeps a small session file, and
//! turns streamed answers into sanitized HTML or terminal text.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────────────┐
//! │   CLI    │──▶│ ApiClient  │──▶│ backend (HTTP)  │
//! │ (ragchat)│   │ auth+retry │   │ REST + SSE      │
//! └────┬─────┘   └─────┬──────┘   └─────────────────┘
//!      │               │
//!      ▼               ▼
//! ┌──────────┐   ┌────────────┐
//! │ markdown │   │  session   │
//! │ sanitize │   │  (JSON)    │
//! └──────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragchat login alice
//! ragchat chat "What does the onboarding guide say about VPN access?"
//! ragchat docs upload ./handbook --tag hr --folder policies
//! ragchat tasks watch --status running
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | `ApiError` / `ChatError` |
//! | [`session`] | Persisted tokens, transcript, preferences |
//! | [`client`] | Authenticated HTTP with refresh-and-retry |
//! | [`auth`] | Login, refresh, registration, token expiry |
//! | [`sse`] | Server-sent event frame decoding |
//! | [`stream`] | Streamed answer assembly |
//! | [`chat`] | Chat queries |
//! | [`conversation`] | Client-held transcript |
//! | [`markdown`] | Markdown rendering with fence repair |
//! | [`sanitize`] | HTML sanitization |
//! | [`documents`] | Document listing, tags, folders, processing |
//! | [`upload`] | Upload queue with progress |
//! | [`files`] | Local file discovery |
//! | [`progress`] | Upload progress reporters |
//! | [`tasks`] | Background task dashboard and poller |
//! | [`admin`] | User administration |
//! | [`analytics`] | Analytics reports |
//! | [`schema`] | Schema introspection and EXPLAIN |
//! | [`system`] | Models, stats, health |
//! | [`models`] | Backend resource shapes |

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod conversation;
pub mod documents;
pub mod error;
pub mod files;
pub mod markdown;
pub mod models;
pub mod progress;
pub mod sanitize;
pub mod schema;
pub mod session;
pub mod sse;
pub mod stream;
pub mod system;
pub mod tasks;
pub mod upload;
