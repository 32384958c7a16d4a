pub mod env_vars;
pub mod global_file;
pub mod project_file;
