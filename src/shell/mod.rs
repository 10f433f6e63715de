// Composition root for the catalog service.
//
// Responsibilities:
// - Read config from the environment.
// - Instantiate the Redis and PostgreSQL adapters.
// - Wire them into the publisher, the reader and the consumer.
// - Expose the HTTP surface.

pub mod config;
pub mod http;
pub mod state;
pub mod telemetry;
