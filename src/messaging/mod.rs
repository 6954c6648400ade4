// Module messaging - Lock-free command queue towards the render callback

pub mod channels;
pub mod command;
