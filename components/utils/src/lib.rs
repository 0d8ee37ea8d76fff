pub mod env;
pub mod logger;
pub mod runtime;

pub mod num_cpus {
    pub use num_cpus::get;
}
