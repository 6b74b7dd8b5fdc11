pub mod postgres;

pub use postgres::PostgresJournal;
