pub mod bench;
pub mod site;
