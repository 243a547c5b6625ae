//! Network addresses seen for hosts: IPs, host names and MAC addresses

use std::net::IpAddr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::case::content::insert_object;
use crate::case::CaseDatabase;
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::hosts::{load_host, Host};
use crate::model::content::to_sql_err;
use crate::model::{code_enum, ObjectType};

code_enum! {
    /// Kind of address. `DnsAuto` is resolved from the address text on insert.
    HostAddressType: i32 {
        DnsAuto = 0 => "DNS Auto-detection",
        Ipv4 = 1 => "IPv4",
        Ipv6 = 2 => "IPv6",
        EthernetMac = 3 => "Ethernet MAC",
        WifiMac = 4 => "WiFi MAC",
        BluetoothMac = 5 => "Bluetooth MAC",
        Hostname = 6 => "Host Name",
    }
}

impl HostAddressType {
    /// Concrete type of `address` when `self` is `DnsAuto`
    pub fn resolve(self, address: &str) -> HostAddressType {
        if self != HostAddressType::DnsAuto {
            return self;
        }
        match address.trim().parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => HostAddressType::Ipv4,
            Ok(IpAddr::V6(_)) => HostAddressType::Ipv6,
            Err(_) => HostAddressType::Hostname,
        }
    }

    pub fn is_ip(self) -> bool {
        matches!(self, HostAddressType::Ipv4 | HostAddressType::Ipv6)
    }
}

/// A row of `tsk_host_addresses`; the id is the address's object id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAddress {
    pub id: i64,
    pub address_type: HostAddressType,
    pub address: String,
}

const ADDRESS_SELECT: &str = "SELECT id, address_type, address FROM tsk_host_addresses";

fn address_from_row(row: &Row<'_>) -> rusqlite::Result<HostAddress> {
    let address_type: i32 = row.get(1)?;
    Ok(HostAddress {
        id: row.get(0)?,
        address_type: to_sql_err(HostAddressType::from_code(address_type))?,
        address: row.get(2)?,
    })
}

fn query_addresses(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<HostAddress>> {
    let mut stmt = conn.prepare(sql)?;
    let addresses = stmt
        .query_map(args, address_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(addresses)
}

fn load_address(conn: &Connection, id: i64) -> Result<HostAddress> {
    conn.query_row(&format!("{} WHERE id = ?1", ADDRESS_SELECT), params![id], address_from_row)
        .optional()?
        .ok_or_else(|| CaseDbError::not_found(format!("host address {}", id)))
}

fn find_address(conn: &Connection, address_type: HostAddressType, address: &str) -> Result<Option<HostAddress>> {
    Ok(conn
        .query_row(
            &format!(
                "{} WHERE address_type = ?1 AND LOWER(address) = LOWER(?2)",
                ADDRESS_SELECT
            ),
            params![address_type.resolve(address).code(), address],
            address_from_row,
        )
        .optional()?)
}

/// Find the address, ignoring case, or create it.
/// The flag is true when the address was created.
fn get_or_create_address(conn: &Connection, address_type: HostAddressType, address: &str) -> Result<(HostAddress, bool)> {
    if address.trim().is_empty() {
        return Err(CaseDbError::invalid("host address must not be empty"));
    }
    let address_type = address_type.resolve(address);
    if let Some(existing) = find_address(conn, address_type, address)? {
        return Ok((existing, false));
    }
    let id = insert_object(conn, None, ObjectType::HostAddress)?;
    conn.execute(
        "INSERT INTO tsk_host_addresses (id, address_type, address) VALUES (?1, ?2, ?3)",
        params![id, address_type.code(), address],
    )?;
    tracing::debug!("Created {} address {} ({})", address_type, address, id);
    Ok((
        HostAddress {
            id,
            address_type,
            address: address.to_string(),
        },
        true,
    ))
}

/// Repoint address mappings from one host to another, dropping duplicates
pub(crate) fn move_addresses_to_host(conn: &Connection, source_host_id: i64, dest_host_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE OR IGNORE tsk_host_address_map SET host_id = ?1 WHERE host_id = ?2",
        params![dest_host_id, source_host_id],
    )?;
    conn.execute(
        "DELETE FROM tsk_host_address_map WHERE host_id = ?1",
        params![source_host_id],
    )?;
    Ok(())
}

/// Host address operations on a case
pub struct HostAddressManager<'a> {
    case: &'a CaseDatabase,
}

impl<'a> HostAddressManager<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    /// Get the address, creating it when missing. `DnsAuto` is resolved to
    /// IPv4, IPv6 or a host name before lookup.
    pub fn new_host_address(&self, address_type: HostAddressType, address: &str) -> Result<HostAddress> {
        self.case.with_transaction(|trans| {
            let (host_address, created) = get_or_create_address(trans, address_type, address)?;
            if created {
                trans.queue_event(CaseEvent::HostAddressesAdded(vec![host_address.clone()]));
            }
            Ok(host_address)
        })
    }

    pub fn get_host_address(&self, address_type: HostAddressType, address: &str) -> Result<Option<HostAddress>> {
        find_address(&*self.case.connection()?, address_type, address)
    }

    pub fn get_host_address_by_id(&self, id: i64) -> Result<HostAddress> {
        load_address(&*self.case.connection()?, id)
    }

    /// Record that `host` used `address`, optionally at `time` and as seen
    /// in `source_obj_id`. Repeating a mapping is a no-op.
    pub fn map_host_to_address(
        &self,
        host: &Host,
        address: &HostAddress,
        time: Option<i64>,
        source_obj_id: Option<i64>,
    ) -> Result<()> {
        let conn = self.case.connection()?;
        load_host(&conn, host.id)?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM tsk_host_address_map
                 WHERE host_id = ?1 AND addr_obj_id = ?2 AND time IS ?3",
                params![host.id, address.id, time],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            conn.execute(
                "INSERT INTO tsk_host_address_map (host_id, addr_obj_id, source_obj_id, time)
                 VALUES (?1, ?2, ?3, ?4)",
                params![host.id, address.id, source_obj_id, time],
            )?;
        }
        Ok(())
    }

    /// Every address mapped to the host
    pub fn get_host_addresses(&self, host: &Host) -> Result<Vec<HostAddress>> {
        query_addresses(
            &*self.case.connection()?,
            "SELECT DISTINCT addr.id, addr.address_type, addr.address
             FROM tsk_host_addresses AS addr
             JOIN tsk_host_address_map AS map ON map.addr_obj_id = addr.id
             WHERE map.host_id = ?1
             ORDER BY addr.id",
            &[&host.id],
        )
    }

    /// Record that `dns_name` resolved to `ip_address`
    pub fn add_host_name_to_ip_mapping(
        &self,
        dns_name: &HostAddress,
        ip_address: &HostAddress,
        time: Option<i64>,
        source_obj_id: Option<i64>,
    ) -> Result<()> {
        if dns_name.address_type != HostAddressType::Hostname {
            return Err(CaseDbError::invalid(format!(
                "{} is not a host name",
                dns_name.address
            )));
        }
        if !ip_address.address_type.is_ip() {
            return Err(CaseDbError::invalid(format!(
                "{} is not an IP address",
                ip_address.address
            )));
        }
        let conn = self.case.connection()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM tsk_host_address_dns_ip_map
                 WHERE dns_address_id = ?1 AND ip_address_id = ?2 AND time IS ?3",
                params![dns_name.id, ip_address.id, time],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            conn.execute(
                "INSERT INTO tsk_host_address_dns_ip_map
                    (dns_address_id, ip_address_id, source_obj_id, time)
                 VALUES (?1, ?2, ?3, ?4)",
                params![dns_name.id, ip_address.id, source_obj_id, time],
            )?;
        }
        Ok(())
    }

    /// IP addresses the host name resolved to
    pub fn get_ip(&self, dns_name: &str) -> Result<Vec<HostAddress>> {
        query_addresses(
            &*self.case.connection()?,
            "SELECT DISTINCT ip.id, ip.address_type, ip.address
             FROM tsk_host_address_dns_ip_map AS map
             JOIN tsk_host_addresses AS ip ON ip.id = map.ip_address_id
             JOIN tsk_host_addresses AS dns ON dns.id = map.dns_address_id
             WHERE dns.address_type = ?1 AND LOWER(dns.address) = LOWER(?2)
             ORDER BY ip.id",
            &[&HostAddressType::Hostname.code(), &dns_name],
        )
    }

    /// Host names that resolved to the IP address
    pub fn get_host_name_by_ip(&self, ip_address: &str) -> Result<Vec<HostAddress>> {
        let ip_type = HostAddressType::DnsAuto.resolve(ip_address);
        if !ip_type.is_ip() {
            return Err(CaseDbError::invalid(format!("{} is not an IP address", ip_address)));
        }
        query_addresses(
            &*self.case.connection()?,
            "SELECT DISTINCT dns.id, dns.address_type, dns.address
             FROM tsk_host_address_dns_ip_map AS map
             JOIN tsk_host_addresses AS ip ON ip.id = map.ip_address_id
             JOIN tsk_host_addresses AS dns ON dns.id = map.dns_address_id
             WHERE ip.address_type = ?1 AND LOWER(ip.address) = LOWER(?2)
             ORDER BY dns.id",
            &[&ip_type.code(), &ip_address],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;

    #[test]
    fn test_dns_auto_resolution() {
        assert_eq!(HostAddressType::DnsAuto.resolve("10.1.2.3"), HostAddressType::Ipv4);
        assert_eq!(HostAddressType::DnsAuto.resolve("fe80::1"), HostAddressType::Ipv6);
        assert_eq!(HostAddressType::DnsAuto.resolve("mail.example.com"), HostAddressType::Hostname);
        assert_eq!(HostAddressType::WifiMac.resolve("10.1.2.3"), HostAddressType::WifiMac);
    }

    #[test]
    fn test_new_host_address_is_get_or_create() {
        let (_temp_dir, case) = create_test_case();
        let addresses = case.host_addresses();

        let a = addresses.new_host_address(HostAddressType::DnsAuto, "Server.Corp.local").unwrap();
        assert_eq!(a.address_type, HostAddressType::Hostname);
        let b = addresses.new_host_address(HostAddressType::Hostname, "server.corp.local").unwrap();
        assert_eq!(a, b);
        assert_eq!(addresses.get_host_address_by_id(a.id).unwrap(), a);
        assert!(addresses
            .get_host_address(HostAddressType::Ipv4, "10.0.0.1")
            .unwrap()
            .is_none());
        assert!(addresses
            .new_host_address(HostAddressType::Ipv4, " ")
            .unwrap_err()
            .is_data_error());
    }

    #[test]
    fn test_host_mapping_survives_merge() {
        let (_temp_dir, case) = create_test_case();
        let addresses = case.host_addresses();
        let laptop = case.hosts().new_host("laptop").unwrap();
        let desktop = case.hosts().new_host("desktop").unwrap();
        let mac = addresses
            .new_host_address(HostAddressType::EthernetMac, "00:11:22:33:44:55")
            .unwrap();

        addresses.map_host_to_address(&laptop, &mac, None, None).unwrap();
        addresses.map_host_to_address(&laptop, &mac, None, None).unwrap();
        assert_eq!(addresses.get_host_addresses(&laptop).unwrap(), vec![mac.clone()]);

        case.hosts().merge_hosts(laptop.id, desktop.id).unwrap();
        assert!(addresses.get_host_addresses(&laptop).unwrap().is_empty());
        assert_eq!(addresses.get_host_addresses(&desktop).unwrap(), vec![mac]);
    }

    #[test]
    fn test_dns_to_ip_mapping() {
        let (_temp_dir, case) = create_test_case();
        let addresses = case.host_addresses();
        let name = addresses.new_host_address(HostAddressType::DnsAuto, "intranet").unwrap();
        let ip = addresses.new_host_address(HostAddressType::DnsAuto, "192.168.1.20").unwrap();
        let mac = addresses
            .new_host_address(HostAddressType::BluetoothMac, "aa:bb:cc:dd:ee:ff")
            .unwrap();

        addresses.add_host_name_to_ip_mapping(&name, &ip, Some(1_600_000_000), None).unwrap();
        assert_eq!(addresses.get_ip("INTRANET").unwrap(), vec![ip.clone()]);
        assert_eq!(addresses.get_host_name_by_ip("192.168.1.20").unwrap(), vec![name.clone()]);
        assert!(addresses.add_host_name_to_ip_mapping(&ip, &name, None, None).is_err());
        assert!(addresses.add_host_name_to_ip_mapping(&name, &mac, None, None).is_err());
        assert!(addresses.get_host_name_by_ip("intranet").is_err());
    }
}
