//! Integration front-ends.
//!
//! Each integration shapes tool-specific input into a v1 event, deriving a
//! stable incident key so triggers and resolves correlate, and submits it
//! through the same `/send` contract as every other producer.

pub mod nagios;
pub mod sensu;
pub mod zabbix;
