pub(crate) mod bootstrap;
mod catalog_file;
mod environment;
mod game_loop;
mod locks;
pub(crate) mod loop_runner;
