#![allow(non_snake_case)]

mod bootstrap;
mod sync;
mod teardown;
