// Server versions this crate negotiates with TWS/Gateway.
// https://github.com/InteractiveBrokers/tws-api/blob/master/source/csharpclient/client/MinServerVer.cs

pub const OPTIONAL_CAPABILITIES: i32 = 72;
// Contract data messages drop their version field from here on.
pub const SIZE_RULES: i32 = 164;
pub const BOND_ISSUERID: i32 = 176;

/// Lowest server version accepted during the handshake.
pub const MIN_SERVER_VERSION: i32 = SIZE_RULES;
/// Highest server version requested during the handshake.
pub const MAX_SERVER_VERSION: i32 = BOND_ISSUERID;
