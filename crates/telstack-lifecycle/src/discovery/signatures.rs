//! Hardware signature table mapping PCI/USB ids to driver modules.

struct Signature {
    vendor: &'static str,
    /// `None` matches every device of the vendor.
    device: Option<&'static str>,
    drivers: &'static [&'static str],
}

const fn exact(
    vendor: &'static str,
    device: &'static str,
    drivers: &'static [&'static str],
) -> Signature {
    Signature {
        vendor,
        device: Some(device),
        drivers,
    }
}

const fn vendor(vendor: &'static str, drivers: &'static [&'static str]) -> Signature {
    Signature {
        vendor,
        device: None,
        drivers,
    }
}

const SIGNATURES: &[Signature] = &[
    exact("d161", "0205", &["wct4xxp"]),
    exact("d161", "0210", &["wct4xxp"]),
    exact("d161", "0220", &["wct4xxp"]),
    exact("d161", "0405", &["wct4xxp"]),
    exact("d161", "0410", &["wct4xxp"]),
    exact("d161", "0420", &["wct4xxp"]),
    exact("d161", "1205", &["wct4xxp"]),
    exact("d161", "1220", &["wct4xxp"]),
    exact("d161", "1405", &["wct4xxp"]),
    exact("d161", "1410", &["wct4xxp"]),
    exact("d161", "1420", &["wct4xxp"]),
    exact("d161", "1820", &["wct4xxp"]),
    exact("d161", "800a", &["wcte13xp"]),
    exact("d161", "800b", &["wcte13xp"]),
    exact("d161", "800e", &["wcte43x"]),
    exact("d161", "800f", &["wcte43x"]),
    exact("d161", "8013", &["wcte43x"]),
    exact("d161", "8005", &["wctdm24xxp"]),
    exact("d161", "8006", &["wctdm24xxp"]),
    exact("d161", "8007", &["wctdm24xxp"]),
    exact("d161", "8008", &["wctdm24xxp"]),
    exact("d161", "800c", &["wcaxx"]),
    exact("d161", "800d", &["wcaxx"]),
    exact("d161", "8010", &["wcaxx"]),
    exact("d161", "8012", &["wcaxx"]),
    exact("d161", "b410", &["wcb4xxp"]),
    exact("1057", "5608", &["wcfxo"]),
    exact("e159", "0001", &["wctdm", "wcfxo"]),
    vendor("e4e4", &["xpp_usb"]),
    vendor("1923", &["wanpipe"]),
];

/// Driver modules known to serve `vendor:device`, most specific first.
pub(super) fn drivers_for(vendor_id: &str, device_id: &str) -> Vec<&'static str> {
    let vendor_id = vendor_id.to_ascii_lowercase();
    let device_id = device_id.to_ascii_lowercase();
    let exact_matches = SIGNATURES
        .iter()
        .filter(|signature| signature.vendor == vendor_id)
        .filter(|signature| signature.device == Some(device_id.as_str()));
    let vendor_matches = SIGNATURES
        .iter()
        .filter(|signature| signature.vendor == vendor_id && signature.device.is_none());
    exact_matches
        .chain(vendor_matches)
        .flat_map(|signature| signature.drivers.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::drivers_for;

    #[rstest]
    #[case::te220("d161", "1220", &["wct4xxp"])]
    #[case::upper_case_ids("D161", "B410", &["wcb4xxp"])]
    #[case::ambiguous_card("e159", "0001", &["wctdm", "wcfxo"])]
    #[case::vendor_wide_usb("e4e4", "1152", &["xpp_usb"])]
    #[case::vendor_wide_wan("1923", "0300", &["wanpipe"])]
    #[case::unknown("8086", "100e", &[])]
    fn maps_signatures_to_drivers(
        #[case] vendor: &str,
        #[case] device: &str,
        #[case] expected: &[&str],
    ) {
        assert_eq!(drivers_for(vendor, device), expected);
    }
}
