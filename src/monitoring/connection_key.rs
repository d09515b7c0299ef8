use std::fmt;

/// One side of a TCP connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: &str, port: u16) -> Self {
        Self {
            address: address.to_string(),
            port,
        }
    }

    pub fn matches(&self, address: &str, port: u16) -> bool {
        self.port == port && self.address == address
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Order-independent identity of an endpoint pair.
///
/// The endpoint with the lower port comes first; on equal ports the
/// lexically smaller address does. Both directions of a connection therefore
/// produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    first: Endpoint,
    second: Endpoint,
}

impl ConnectionKey {
    pub fn normalize(addr_a: &str, port_a: u16, addr_b: &str, port_b: u16) -> Self {
        let a_first = match port_a.cmp(&port_b) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => addr_a <= addr_b,
        };

        let (a, b) = (Endpoint::new(addr_a, port_a), Endpoint::new(addr_b, port_b));
        if a_first {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &Endpoint {
        &self.first
    }

    pub fn second(&self) -> &Endpoint {
        &self.second
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.first, self.second)
    }
}
