//! Spoofed client addresses for simulating distributed traffic.
use std::net::Ipv4Addr;

use rand::{Rng, seq::SliceRandom};

use crate::config::IpSpoofingConfig;

/// Headers that carry the client address through common proxies and CDNs.
pub const SPOOFING_HEADERS: [&str; 7] = [
    "X-Forwarded-For",
    "X-Real-IP",
    "X-Originating-IP",
    "X-Client-IP",
    "CF-Connecting-IP",
    "True-Client-IP",
    "X-Original-Forwarded-For",
];

struct RegionRanges {
    region: &'static str,
    residential: &'static [&'static str],
    datacenter: &'static [&'static str],
}

static RANGES: [RegionRanges; 3] = [
    RegionRanges {
        region: "US",
        residential: &[
            "73.0.0.0/8",
            "98.0.0.0/8",
            "174.0.0.0/8",
            "76.0.0.0/8",
            "108.0.0.0/8",
            "71.0.0.0/8",
            "97.0.0.0/8",
            "99.0.0.0/8",
            "72.0.0.0/8",
            "75.0.0.0/8",
            "24.0.0.0/8",
            "70.0.0.0/8",
            "96.0.0.0/8",
        ],
        datacenter: &[
            "54.0.0.0/8",
            "52.0.0.0/8",
            "3.0.0.0/8",
            "35.0.0.0/8",
            "104.154.0.0/16",
            "13.64.0.0/11",
            "40.64.0.0/10",
            "159.89.0.0/16",
            "138.197.0.0/16",
        ],
    },
    RegionRanges {
        region: "EU",
        residential: &[
            "77.0.0.0/8",
            "91.0.0.0/8",
            "212.0.0.0/8",
            "86.0.0.0/8",
            "90.0.0.0/8",
            "81.0.0.0/8",
            "87.0.0.0/8",
            "79.0.0.0/8",
            "93.0.0.0/8",
            "82.0.0.0/8",
            "84.0.0.0/8",
        ],
        datacenter: &[
            "18.0.0.0/8",
            "34.0.0.0/8",
            "35.156.0.0/16",
            "35.198.0.0/16",
            "13.69.0.0/16",
            "40.67.0.0/16",
            "78.46.0.0/15",
            "138.201.0.0/16",
        ],
    },
    RegionRanges {
        region: "APAC",
        residential: &[
            "126.0.0.0/8",
            "210.0.0.0/8",
            "117.0.0.0/8",
            "124.0.0.0/8",
            "114.0.0.0/8",
            "116.0.0.0/8",
            "165.21.0.0/16",
            "203.116.0.0/16",
            "101.0.0.0/8",
            "103.0.0.0/8",
        ],
        datacenter: &[
            "13.228.0.0/16",
            "52.74.0.0/16",
            "35.187.0.0/16",
            "35.236.0.0/16",
            "13.75.0.0/16",
            "40.83.0.0/16",
            "47.74.0.0/15",
            "8.208.0.0/16",
        ],
    },
];

/// RFC 5737 documentation ranges, used when no pool is configured.
const TEST_RANGES: [&str; 2] = ["198.51.100.0/24", "203.0.113.0/24"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Net {
    network: u32,
    prefix: u8,
}

impl Ipv4Net {
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, prefix) = cidr.split_once('/')?;
        let addr: Ipv4Addr = addr.trim().parse().ok()?;
        let prefix: u8 = prefix.trim().parse().ok()?;
        if prefix > 32 {
            return None;
        }

        Some(Self {
            network: u32::from(addr) & Self::mask(prefix),
            prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
    }

    fn broadcast(&self) -> u32 {
        self.network | !Self::mask(self.prefix)
    }

    /// Splits into subnets of `prefix`; returns `self` if already that small.
    fn subnets(self, prefix: u8) -> Vec<Self> {
        if self.prefix >= prefix {
            return vec![self];
        }

        let count = 1u32 << (prefix - self.prefix);
        let step = 1u32 << (32 - prefix);
        (0..count)
            .map(|i| Self {
                network: self.network + i * step,
                prefix,
            })
            .collect()
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask(self.prefix) == self.network
    }

    /// Random host address, skipping the network and broadcast addresses.
    fn random_host<R: Rng>(&self, rng: &mut R) -> Ipv4Addr {
        let (first, last) = (self.network, self.broadcast());
        if last - first < 3 {
            return Ipv4Addr::from(first.saturating_add(1).min(last));
        }

        Ipv4Addr::from(rng.gen_range(first + 1..last))
    }
}

fn parse_all(cidrs: &[&str]) -> impl Iterator<Item = Ipv4Net> {
    cidrs.iter().filter_map(|cidr| {
        let net = Ipv4Net::parse(cidr);
        if net.is_none() {
            log::warn!("Skipping invalid CIDR range {cidr}");
        }
        net
    })
}

/// Picks spoofed addresses from ISP and cloud ranges, rotating every
/// `rotation_interval` requests or pinning one address in burst mode.
#[derive(Debug, Clone)]
pub struct IpGenerator {
    ranges: Vec<Ipv4Net>,
    rotation_interval: u32,
    burst_mode: bool,
    current: Option<Ipv4Addr>,
    served: u32,
}

impl IpGenerator {
    pub fn new(config: &IpSpoofingConfig, burst_mode: bool) -> Self {
        let mut ranges = Vec::new();

        for region in RANGES
            .iter()
            .filter(|r| config.regions.iter().any(|c| c.eq_ignore_ascii_case(r.region)))
        {
            if config.include_residential {
                // Large ISP blocks are split so that each /16 is equally likely.
                ranges.extend(parse_all(region.residential).flat_map(|net| net.subnets(16)));
            }
            if config.include_datacenter {
                ranges.extend(parse_all(region.datacenter));
            }
        }

        Self {
            ranges,
            rotation_interval: config.rotation_interval.max(1),
            burst_mode,
            current: None,
            served: 0,
        }
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn current_ip(&self) -> Option<Ipv4Addr> {
        self.current
    }

    /// Forces a new address on the next request.
    pub fn reset_rotation(&mut self) {
        self.served = self.rotation_interval;
    }

    fn generate<R: Rng>(&self, rng: &mut R) -> Ipv4Addr {
        if let Some(net) = self.ranges.choose(rng) {
            return net.random_host(rng);
        }

        let fallback = parse_all(&TEST_RANGES).collect::<Vec<_>>();
        fallback
            .choose(rng)
            .map_or(Ipv4Addr::new(198, 51, 100, 1), |net| net.random_host(rng))
    }

    pub fn next_ip<R: Rng>(&mut self, rng: &mut R) -> Ipv4Addr {
        if self.burst_mode {
            if let Some(ip) = self.current {
                return ip;
            }
            let ip = self.generate(rng);
            self.current = Some(ip);
            return ip;
        }

        match self.current {
            Some(ip) if self.served < self.rotation_interval => {
                self.served += 1;
                ip
            }
            _ => {
                let ip = self.generate(rng);
                self.current = Some(ip);
                self.served = 1;
                ip
            }
        }
    }

    /// Every spoofing header set to the next address.
    pub fn spoofing_headers<R: Rng>(&mut self, rng: &mut R) -> Vec<(&'static str, String)> {
        let ip = self.next_ip(rng).to_string();
        SPOOFING_HEADERS.iter().map(|h| (*h, ip.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn config(regions: &[&str], residential: bool, datacenter: bool) -> IpSpoofingConfig {
        IpSpoofingConfig {
            enabled: true,
            rotation_interval: 3,
            regions: regions.iter().map(|r| r.to_string()).collect(),
            include_residential: residential,
            include_datacenter: datacenter,
        }
    }

    #[test]
    fn parses_and_masks_cidr() {
        let net = Ipv4Net::parse("13.64.5.7/11").unwrap();
        assert!(net.contains(Ipv4Addr::new(13, 64, 0, 1)));
        assert!(net.contains(Ipv4Addr::new(13, 95, 255, 254)));
        assert!(!net.contains(Ipv4Addr::new(13, 96, 0, 1)));
        assert!(Ipv4Net::parse("1.2.3.4/33").is_none());
        assert!(Ipv4Net::parse("nonsense").is_none());
    }

    #[test]
    fn residential_blocks_are_split() {
        let generator = IpGenerator::new(&config(&["US"], true, false), false);
        assert_eq!(generator.range_count(), 13 * 256);

        let generator = IpGenerator::new(&config(&["US"], false, true), false);
        assert_eq!(generator.range_count(), 9);
    }

    #[test]
    fn rotates_after_interval() {
        let mut generator = IpGenerator::new(&config(&["EU"], true, true), false);
        let mut rng = StdRng::seed_from_u64(9);

        let first = generator.next_ip(&mut rng);
        assert_eq!(generator.next_ip(&mut rng), first);
        assert_eq!(generator.next_ip(&mut rng), first);
        // The chance of drawing the same address twice is negligible.
        assert_ne!(generator.next_ip(&mut rng), first);

        generator.reset_rotation();
        let before = generator.current_ip();
        assert_ne!(Some(generator.next_ip(&mut rng)), before);
    }

    #[test]
    fn burst_mode_pins_one_address() {
        let mut generator = IpGenerator::new(&config(&["APAC"], true, true), true);
        let mut rng = StdRng::seed_from_u64(4);

        let first = generator.next_ip(&mut rng);
        for _ in 0..20 {
            assert_eq!(generator.next_ip(&mut rng), first);
        }
    }

    #[test]
    fn falls_back_to_documentation_ranges() {
        let mut generator = IpGenerator::new(&config(&["US"], false, false), false);
        let mut rng = StdRng::seed_from_u64(5);
        let ip = generator.next_ip(&mut rng);

        let test_nets: Vec<_> = TEST_RANGES.iter().filter_map(|c| Ipv4Net::parse(c)).collect();
        assert!(test_nets.iter().any(|net| net.contains(ip)));
    }

    #[test]
    fn generated_addresses_fall_in_pool() {
        let mut generator = IpGenerator::new(&config(&["US", "EU", "APAC"], true, true), false);
        let mut rng = StdRng::seed_from_u64(6);

        for _ in 0..50 {
            generator.reset_rotation();
            let ip = generator.next_ip(&mut rng);
            assert!(generator.ranges.iter().any(|net| net.contains(ip)));
        }

        let headers = generator.spoofing_headers(&mut rng);
        assert_eq!(headers.len(), SPOOFING_HEADERS.len());
        assert!(headers.iter().all(|(_, v)| v == &headers[0].1));
    }
}
