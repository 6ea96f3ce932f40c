pub mod configs;
pub mod health;
pub mod jobs;
pub mod publish;
pub mod system;
