// LAN address discovery and listener creation for the pairing server

mod address;
mod listeners;

pub use address::{
    AddressResolver, FixedAddress, InterfaceSource, NetInterface, ResolveAddress,
    SystemInterfaces,
};
pub use listeners::create_exclusive_listener;
