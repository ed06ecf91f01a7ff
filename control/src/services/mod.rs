pub mod lifecycle;

pub use lifecycle::LifecycleService;
