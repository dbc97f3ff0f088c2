//! # adsmith
//!
//! An LLM pipeline that researches a company's market, synthesises a
//! marketing strategy and writes ad copy for each campaign concept.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌────────────┐
//! │ Research │──▶│ Marketing │──▶│ Ad         │
//! │  agent   │   │  agent    │   │ generator  │
//! └────┬─────┘   └─────┬─────┘   └─────┬──────┘
//!      │               │               │
//!      └───────────────┼───────────────┘
//!                      ▼
//!            ┌───────────────────┐       ┌───────────────┐
//!            │  TwoTierCache     │──────▶│ Azure OpenAI  │
//!            │ session ▸ SQLite  │ miss  │ chat model    │
//!            └───────────────────┘       └───────────────┘
//!
//!         runs + stage outputs ──▶ SQLite history ──▶ CLI / HTTP API
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export AZURE_OPENAI_API_KEY=... AZURE_OPENAI_API_BASE=... \
//!        AZURE_OPENAI_API_VERSION=... AZURE_OPENAI_DEPLOYMENT_NAME=... \
//!        TAVILY_API_KEY=...
//! adsmith init
//! adsmith run "Acme Running Shoes" --audience "urban runners" --output ./Outputs
//! adsmith history
//! adsmith serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`settings`] | Required credentials from the environment |
//! | [`config`] | TOML configuration parsing |
//! | [`llm`] | Chat model trait and Azure OpenAI client |
//! | [`web_search`] | Tavily web search for the research agent |
//! | [`images`] | Stability text-to-image for campaign assets |
//! | [`cache`] | Two-tier generation cache |
//! | [`agents`] | Research, marketing and ad generation stages |
//! | [`pipeline`] | Sequential stage orchestration |
//! | [`history`] | Run history |
//! | [`progress`] | Stage progress reporting |
//! | [`server`] | Dashboard HTTP API |
//! | [`runtime`] | Wiring shared by the CLI and server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agents;
pub mod cache;
pub mod config;
pub mod db;
pub mod history;
pub mod images;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod runtime;
pub mod server;
pub mod settings;
pub mod web_search;
