pub mod traits;
pub mod manager;
pub mod resolvers;

pub use manager::ResolverRegistry;
pub use traits::LunchResolver;
