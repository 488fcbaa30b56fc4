#![allow(dead_code)]

pub mod character_master;
pub mod character_master_data;
