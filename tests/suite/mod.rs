mod anchor;
mod flow;
mod persistence;
mod query_checksum;
mod slots;
