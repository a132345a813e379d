//! Call an OpenAPI endpoint interactively and explain the response.
//!
//! Fetches an OpenAPI JSON document, works out which inputs one endpoint
//! requires, prompts for them, sends the request (re-prompting once if the
//! server reports missing fields), keeps any bearer token a login returns,
//! and asks a language model to explain the result.
//!
//! # Usage
//!
//! ```no_run
//! use openapi_assist::{Assistant, Cli, Collector, Config, DetailMarker, OllamaClient, Session};
//! use clap::Parser;
//!
//! let cli = Cli::parse_from(["openapi-assist", "/api/login"]);
//! let config = Config::load(&cli).unwrap();
//! let llm = OllamaClient::new(config.llm_http_client().unwrap(), &config.llm.url, &config.llm.model);
//! let detector = DetailMarker::default();
//!
//! let stdin = std::io::stdin().lock();
//! let mut assistant = Assistant::new(
//!     config.http_client().unwrap(),
//!     &config,
//!     &llm,
//!     &detector,
//!     Collector::new(stdin, std::io::stdout()),
//! );
//! assistant.run(&mut Session::new()).unwrap();
//! ```

pub mod audit;
pub mod collect;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod explain;
pub mod llm;
pub mod loader;
pub mod session;
pub mod spec;
pub mod workflow;

pub use audit::{DetailMarker, LlmAssisted, MissingField, MissingFieldDetector};
pub use collect::{Collector, UserInputSet};
pub use config::{Cli, Config, MissingFieldStrategy, Target};
pub use dispatch::{dispatch, ApiResponse, ResponseBody};
pub use error::AssistError;
pub use explain::explain;
pub use llm::{LanguageModel, OllamaClient};
pub use loader::fetch_spec;
pub use session::{propagate_token, Session};
pub use spec::{extract_endpoint, EndpointDescriptor, Field, Location};
pub use workflow::{Assistant, EndpointOutcome};

// Re-export dependencies for downstream crates
pub use clap;
pub use reqwest;
