//! Compiled-in carrier APN table
//!
//! When the application does not supply an APN, attach looks up the SIM's
//! IMSI here. The IMSI starts with the home network's MCC (3 digits) and MNC
//! (2 or 3 digits); each carrier lists the APN settings to try in order.

/// One set of data session credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApnEntry {
    pub apn: &'static str,
    pub username: &'static str,
    pub password: &'static str,
}

/// A carrier and the credentials it is known to accept.
#[derive(Debug, Clone, Copy)]
pub struct Carrier {
    pub name: &'static str,
    pub mcc: &'static str,
    pub mncs: &'static [&'static str],
    pub entries: &'static [ApnEntry],
}

const fn apn(apn: &'static str, username: &'static str, password: &'static str) -> ApnEntry {
    ApnEntry {
        apn,
        username,
        password,
    }
}

/// Known carriers.
pub const CARRIERS: &[Carrier] = &[
    Carrier {
        name: "T-Mobile AT",
        mcc: "232",
        mncs: &["03"],
        entries: &[apn("gprsinternet", "", "")],
    },
    Carrier {
        name: "China Mobile",
        mcc: "460",
        mncs: &["00"],
        entries: &[apn("cmnet", "", ""), apn("cmwap", "", "")],
    },
    Carrier {
        name: "China Unicom",
        mcc: "460",
        mncs: &["01"],
        entries: &[apn("3gnet", "", ""), apn("uninet", "uninet", "uninet")],
    },
    Carrier {
        name: "Telekom DE",
        mcc: "262",
        mncs: &["01"],
        entries: &[apn("internet.t-mobile", "t-mobile", "tm")],
    },
    Carrier {
        name: "Telekom DE M2M",
        mcc: "262",
        mncs: &["02", "06"],
        entries: &[apn("m2m.business", "", "")],
    },
    Carrier {
        name: "TIM",
        mcc: "222",
        mncs: &["01"],
        entries: &[apn("ibox.tim.it", "", "")],
    },
    Carrier {
        name: "Vodafone IT",
        mcc: "222",
        mncs: &["10"],
        entries: &[apn("web.omnitel.it", "", "")],
    },
    Carrier {
        name: "KORE",
        mcc: "204",
        mncs: &["04"],
        entries: &[apn("vfd1.korem2m.com", "", "")],
    },
    Carrier {
        name: "Telefonica ES",
        mcc: "214",
        mncs: &["07"],
        entries: &[apn("spark.telefonica.com", "", "")],
    },
    Carrier {
        name: "Swisscom",
        mcc: "228",
        mncs: &["01"],
        entries: &[apn("gprs.swisscom.ch", "", "")],
    },
    Carrier {
        name: "O2 UK",
        mcc: "234",
        mncs: &["02", "10", "11"],
        entries: &[apn("mobile.o2.co.uk", "faster", "web")],
    },
    Carrier {
        name: "Vodafone UK",
        mcc: "234",
        mncs: &["15"],
        entries: &[apn("internet", "web", "web"), apn("pp.vodafone.co.uk", "wap", "wap")],
    },
    Carrier {
        name: "Three UK",
        mcc: "234",
        mncs: &["20"],
        entries: &[apn("three.co.uk", "", "")],
    },
    Carrier {
        name: "AT&T",
        mcc: "310",
        mncs: &["030", "150", "170", "410", "560", "680"],
        entries: &[
            apn("broadband", "", ""),
            apn("phone", "", ""),
            apn("wap.cingular", "WAP@CINGULARGPRS.COM", "CINGULAR1"),
        ],
    },
    Carrier {
        name: "T-Mobile US",
        mcc: "310",
        mncs: &["026", "260", "490"],
        entries: &[apn("fast.t-mobile.com", "", ""), apn("epc.tmobile.com", "", "")],
    },
];

/// Carrier serving `imsi`, if known.
pub fn carrier(imsi: &str) -> Option<&'static Carrier> {
    CARRIERS.iter().find(|c| {
        imsi.strip_prefix(c.mcc)
            .is_some_and(|rest| c.mncs.iter().any(|mnc| rest.starts_with(mnc)))
    })
}

/// APN candidates for `imsi`, empty when the carrier is unknown.
pub fn lookup(imsi: &str) -> &'static [ApnEntry] {
    carrier(imsi).map(|c| c.entries).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_imsi_prefix() {
        let entries = lookup("234150123456789");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].apn, "internet");
        assert_eq!(entries[1].apn, "pp.vodafone.co.uk");
        assert_eq!(entries[1].username, "wap");
    }

    #[test]
    fn test_three_digit_mnc() {
        assert_eq!(carrier("310410123456789").map(|c| c.name), Some("AT&T"));
        assert_eq!(carrier("310260123456789").map(|c| c.name), Some("T-Mobile US"));
    }

    #[test]
    fn test_unknown_carrier() {
        assert!(lookup("999990000000000").is_empty());
        assert!(lookup("").is_empty());
    }
}
