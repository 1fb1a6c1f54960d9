mod bootstrap;
mod loop_runner;
mod probe;
mod props;
mod proximity;
mod scenario;
mod session;

pub(crate) use bootstrap::build_app;
pub(crate) use loop_runner::run;
