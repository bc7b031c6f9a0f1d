use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Chain {
    #[default]
    Mainnet,
    Testnet,
    Testnet4,
    Signet,
    Regtest,
}

impl Chain {
    pub fn network(self) -> Network {
        match self {
            Self::Mainnet => Network::Bitcoin,
            Self::Testnet => Network::Testnet,
            Self::Testnet4 => Network::Testnet4,
            Self::Signet => Network::Signet,
            Self::Regtest => Network::Regtest,
        }
    }

    /// P2P magic bytes, little-endian as they appear on the wire.
    pub fn magic(self) -> u32 {
        match self {
            Self::Mainnet => 0xD9B4BEF9,
            Self::Testnet => 0x0709110B,
            Self::Testnet4 => 0x283F161C,
            Self::Signet => 0x40CF030A,
            Self::Regtest => 0xDAB5BFFA,
        }
    }

    pub fn default_p2p_port(self) -> u16 {
        match self {
            Self::Mainnet => 8333,
            Self::Testnet => 18333,
            Self::Testnet4 => 48333,
            Self::Signet => 38333,
            Self::Regtest => 18444,
        }
    }

    pub fn default_rpc_port(self) -> u16 {
        match self {
            Self::Mainnet => 8332,
            Self::Testnet => 18332,
            Self::Testnet4 => 48332,
            Self::Signet => 38332,
            Self::Regtest => 18443,
        }
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Mainnet => "bitcoin",
                Self::Testnet => "testnet",
                Self::Testnet4 => "testnet4",
                Self::Signet => "signet",
                Self::Regtest => "regtest",
            }
        )
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "bitcoin" | "mainnet" => Self::Mainnet,
            "testnet" => Self::Testnet,
            "testnet4" => Self::Testnet4,
            "signet" => Self::Signet,
            "regtest" => Self::Regtest,
            other => bail!("unknown chain: {other}"),
        })
    }
}
