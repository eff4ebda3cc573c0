use std::fmt;

use dns_parser::{Packet, RData, ResponseCode};
use pnet::packet::dns::{MutableDnsPacket, Opcode, Retcode};
use thiserror::Error;

pub const DNS_HDR_LEN: usize = 12;
pub const DNS_PORT: u16 = 53;
const CLASS_IN: u16 = 1;
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("empty label in name '{0}'")]
    EmptyLabel(String),
    #[error("label '{0}' is longer than 63 bytes")]
    LabelTooLong(String),
    #[error("name '{0}' is longer than 255 bytes")]
    NameTooLong(String),
    #[error("buffer too small for dns header")]
    Buffer,
}

/// Builds a standard query with recursion desired and a single question.
pub fn create_query(name: &str, qtype: u16, id: u16) -> Result<Vec<u8>, DnsError> {
    let qname: Vec<u8> = encode_dns_name(name)?;
    let total: usize = DNS_HDR_LEN + qname.len() + 4;
    let mut buffer: Vec<u8> = vec![0u8; total];

    {
        let mut dns = MutableDnsPacket::new(&mut buffer).ok_or(DnsError::Buffer)?;
        dns.set_id(id);
        dns.set_is_response(0);
        dns.set_opcode(Opcode::StandardQuery);
        dns.set_is_authoriative(0);
        dns.set_is_truncated(0);
        dns.set_is_recursion_desirable(1);
        dns.set_is_recursion_available(0);
        dns.set_zero_reserved(0);
        dns.set_is_non_authenticated_data(0);
        dns.set_rcode(Retcode::NoError);
        dns.set_query_count(1);
        dns.set_response_count(0);
        dns.set_authority_rr_count(0);
        dns.set_additional_rr_count(0);
    }

    let mut cursor: usize = DNS_HDR_LEN;
    buffer[cursor..cursor + qname.len()].copy_from_slice(&qname);
    cursor += qname.len();
    buffer[cursor..cursor + 2].copy_from_slice(&qtype.to_be_bytes());
    cursor += 2;
    buffer[cursor..cursor + 2].copy_from_slice(&CLASS_IN.to_be_bytes());

    Ok(buffer)
}

/// Wire encoding of a dotted name. A trailing dot is accepted.
pub fn encode_dns_name(name: &str) -> Result<Vec<u8>, DnsError> {
    let trimmed: &str = name.strip_suffix('.').unwrap_or(name);
    let mut encoded: Vec<u8> = Vec::with_capacity(trimmed.len() + 2);

    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(DnsError::EmptyLabel(name.to_string()));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(DnsError::LabelTooLong(label.to_string()));
            }
            encoded.push(label.len() as u8);
            encoded.extend_from_slice(label.as_bytes());
        }
    }
    encoded.push(0);

    if encoded.len() > MAX_NAME_LEN {
        return Err(DnsError::NameTooLong(name.to_string()));
    }
    Ok(encoded)
}

/// The parts of a response that end up in a result line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSummary {
    pub id: u16,
    pub qname: String,
    pub rcode: &'static str,
    pub answers: usize,
    /// Rendering of the first A, AAAA or CNAME answer.
    pub first_answer: Option<String>,
}

impl fmt::Display for DnsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} answers", self.rcode, self.answers)?;
        if let Some(first) = &self.first_answer {
            write!(f, ": {first}")?;
        }
        Ok(())
    }
}

/// Parses a DNS response. Queries and unparsable payloads yield `None`.
pub fn summarize_response(payload: &[u8]) -> Option<DnsSummary> {
    let packet = Packet::parse(payload).ok()?;
    if packet.header.query {
        return None;
    }
    let qname: String = packet.questions.first()?.qname.to_string();

    let first_answer: Option<String> = packet.answers.iter().find_map(|rr| match &rr.data {
        RData::A(a) => Some(a.0.to_string()),
        RData::AAAA(aaaa) => Some(aaaa.0.to_string()),
        RData::CNAME(cname) => Some(cname.0.to_string()),
        _ => None,
    });

    Some(DnsSummary {
        id: packet.header.id,
        qname,
        rcode: rcode_name(packet.header.response_code),
        answers: packet.answers.len(),
        first_answer,
    })
}

fn rcode_name(code: ResponseCode) -> &'static str {
    match code {
        ResponseCode::NoError => "NOERROR",
        ResponseCode::FormatError => "FORMERR",
        ResponseCode::ServerFailure => "SERVFAIL",
        ResponseCode::NameError => "NXDOMAIN",
        ResponseCode::NotImplemented => "NOTIMP",
        ResponseCode::Refused => "REFUSED",
        ResponseCode::Reserved(_) => "RESERVED",
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_layout_is_byte_exact() {
        let query = create_query("example.com", 1, 0xbeef).unwrap();
        let expected = hex::decode(concat!(
            "beef01000001000000000000",
            "076578616d706c6503636f6d00",
            "00010001"
        ))
        .unwrap();
        assert_eq!(query, expected);
    }

    #[test]
    fn query_parses_back_with_dns_parser() {
        let query = create_query("www.example.org.", 28, 7).unwrap();
        let packet = Packet::parse(&query).unwrap();
        assert!(packet.header.query);
        assert!(packet.header.recursion_desired);
        assert_eq!(packet.questions[0].qname.to_string(), "www.example.org");
        // a query is not a response
        assert_eq!(summarize_response(&query), None);
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(matches!(encode_dns_name("a..b"), Err(DnsError::EmptyLabel(_))));
        let long_label = "a".repeat(64);
        assert!(matches!(encode_dns_name(&long_label), Err(DnsError::LabelTooLong(_))));
        let long_name = ["abcdefghij"; 30].join(".");
        assert!(matches!(encode_dns_name(&long_name), Err(DnsError::NameTooLong(_))));
    }

    #[test]
    fn response_summary() {
        // id 0x1234, QR+RD+RA, one question, one A answer (compressed name)
        let response = hex::decode(concat!(
            "123481800001000100000000",
            "076578616d706c6503636f6d0000010001",
            "c00c000100010000012c00045db8d822"
        ))
        .unwrap();
        let summary = summarize_response(&response).unwrap();
        assert_eq!(summary.id, 0x1234);
        assert_eq!(summary.qname, "example.com");
        assert_eq!(summary.rcode, "NOERROR");
        assert_eq!(summary.answers, 1);
        assert_eq!(summary.to_string(), "NOERROR 1 answers: 93.184.216.34");
    }

    #[test]
    fn nxdomain_summary() {
        let response = hex::decode(concat!(
            "abcd81830001000000000000",
            "076578616d706c6503636f6d0000010001"
        ))
        .unwrap();
        let summary = summarize_response(&response).unwrap();
        assert_eq!(summary.rcode, "NXDOMAIN");
        assert_eq!(summary.to_string(), "NXDOMAIN 0 answers");
    }
}
