pub mod metadata;

pub use metadata::TokenResolver;
