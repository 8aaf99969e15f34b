pub mod ports;
pub mod run;
pub mod sources;
