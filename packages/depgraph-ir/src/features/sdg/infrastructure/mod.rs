pub mod builder;

pub use builder::SdgBuilder;
