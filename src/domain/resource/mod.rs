pub mod assignment;
pub mod resource;
pub mod resource_path;
pub mod resource_tree;
pub mod resource_type;
