mod jobs;
mod scheduler;

pub use jobs::refresh_key_prices::KeyPrices;
pub use scheduler::CronScheduler;
