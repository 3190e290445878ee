pub mod battery;
pub mod cli;
pub mod config;
pub mod cpufreq;
pub mod cstate;
pub mod display;
pub mod error;
pub mod input;
pub mod irq;
pub mod probes;
pub mod samples;
pub mod session;
pub mod suggest;
pub mod sysfs;
pub mod timer_stats;
pub mod usb;
