mod config_loading;
mod fs_abstraction;
