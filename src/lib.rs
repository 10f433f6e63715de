pub mod core {
    pub mod catalog_entry;
    pub mod ports;
}

pub mod application {
    pub mod consumer;
    pub mod create_entry;
    pub mod errors;
    pub mod handshake;
    pub mod publisher;
    pub mod reader;
}

pub mod adapters {
    pub mod in_memory {
        pub mod in_memory_broker;
        pub mod in_memory_cache;
        pub mod in_memory_store;
    }
    pub mod redis {
        pub mod redis_cache;
        pub mod redis_stream_broker;
    }
    pub mod postgres {
        pub mod postgres_store;
    }
    pub mod inbound {
        pub mod http {
            pub mod catalog_queries;
            pub mod create_entry;
            pub mod health;
        }
    }
}

pub mod shell;
