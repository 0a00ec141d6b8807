use capture_task_manager::taxonomy::{InstrumentClass, RawDataType};

#[test]
fn instrument_class_names_round_trip() {
    for class in InstrumentClass::ALL {
        assert_eq!(InstrumentClass::classify(class.name()), class);
        assert_eq!(
            InstrumentClass::classify(&class.name().to_ascii_lowercase()),
            class
        );
        assert_eq!(
            InstrumentClass::classify(&format!("  {}  ", class.name())),
            class
        );
    }
}

#[test]
fn raw_data_type_tokens_round_trip() {
    for raw in RawDataType::ALL {
        assert_eq!(RawDataType::classify(raw.token()), raw);
        assert_eq!(
            RawDataType::classify(&raw.token().to_ascii_uppercase()),
            raw
        );
    }
}

#[test]
fn unknown_names_classify_as_unknown() {
    assert_eq!(InstrumentClass::classify("Cyclotron9000"), InstrumentClass::Unknown);
    assert_eq!(InstrumentClass::classify(""), InstrumentClass::Unknown);
    assert_eq!(RawDataType::classify("dot_tar_files"), RawDataType::Unknown);
}

#[test]
fn serde_uses_broker_names() {
    let class: InstrumentClass = serde_json::from_str("\"brukermaldi_imaging\"").unwrap();
    assert_eq!(class, InstrumentClass::BrukerMaldiImaging);
    assert_eq!(
        serde_json::to_string(&InstrumentClass::BrukerMaldiImaging).unwrap(),
        "\"BrukerMALDI_Imaging\""
    );

    let raw: RawDataType = serde_json::from_str("\"DOT_RAW_FILES\"").unwrap();
    assert_eq!(raw, RawDataType::ThermoRawFile);
}

#[test]
fn thermo_instruments_produce_raw_files() {
    let raw = InstrumentClass::QExactive.default_raw_data_type();
    assert_eq!(raw, RawDataType::ThermoRawFile);
    assert!(raw.searches_files_first());
    assert!(!RawDataType::BrukerTofTdf.searches_files_first());
}
