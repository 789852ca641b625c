mod handlers;
mod shared_keys;
mod signers;
mod status;
mod store;
