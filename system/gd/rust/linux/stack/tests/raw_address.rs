#[cfg(test)]
mod tests {
    use bt_hfp_ag::RawAddress;

    #[test]
    fn from_string_invalid() {
        assert!(RawAddress::from_string("").is_none());
        assert!(RawAddress::from_string("some invalid string").is_none());
        assert!(RawAddress::from_string("aa:bb:cc:dd:ee:ff:00").is_none());
        assert!(RawAddress::from_string("aa:bb:cc:dd:ee").is_none());
        assert!(RawAddress::from_string("aa:bb:cc:dd::ff").is_none());
        assert!(RawAddress::from_string("aa:bb:cc:dd:ee:fg").is_none());
        assert!(RawAddress::from_string("aa:bb:cc:dd:ee:f").is_none());
    }

    #[test]
    fn from_string_valid() {
        let addr = RawAddress::from_string("11:22:33:aa:bb:cc");
        assert!(addr.is_some());
        assert_eq!([0x11, 0x22, 0x33, 0xaa, 0xbb, 0xcc], addr.unwrap().to_byte_arr());

        // Upper/lower case should not matter.
        let addr = RawAddress::from_string("11:22:33:AA:BB:CC");
        assert!(addr.is_some());
        assert_eq!([0x11, 0x22, 0x33, 0xaa, 0xbb, 0xcc], addr.unwrap().to_byte_arr());
    }

    #[test]
    fn from_bytes_invalid() {
        assert!(RawAddress::from_bytes(&[]).is_none());
        assert!(RawAddress::from_bytes(&[1, 2, 3, 4, 5]).is_none());
        assert!(RawAddress::from_bytes(&[1, 2, 3, 4, 5, 6, 7]).is_none());
    }

    #[test]
    fn from_bytes_valid() {
        let addr = RawAddress::from_bytes(&[1, 2, 3, 4, 5, 6]);
        assert!(addr.is_some());
        assert_eq!([1, 2, 3, 4, 5, 6], addr.unwrap().to_byte_arr());
    }

    #[test]
    fn display_is_upper_case() {
        let addr = RawAddress { address: [0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f] };
        assert_eq!("0A:1B:2C:3D:4E:5F", addr.to_string());
        assert_eq!(RawAddress::from_string(addr.to_string()), Some(addr));
    }
}
