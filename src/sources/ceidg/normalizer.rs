//! Normalization of raw CEIDG entries into [`CeidgProfile`].

use serde_json::{Map, Value};

use crate::coerce::{
    coerce_entries, coerce_object, coerce_str, empty_object, is_truthy, parse_date, section,
    str_at,
};
use crate::model::{AddressKind, CeidgProfile, NormalizedAddress};

/// Normalize a single decoded CEIDG entry. Never fails; missing or
/// malformed sub-structures leave their fields unset.
pub fn normalize(entry: &Value) -> CeidgProfile {
    let root = coerce_object(entry).unwrap_or_else(|| empty_object());

    let owner = section(root, "wlasciciel");

    let business_name = str_at(root, "firma").or_else(|| str_at(root, "nazwa"));

    let main_address = root
        .get("adresDzialalnosci")
        .and_then(|v| extract_address(v, AddressKind::Main))
        .or_else(|| {
            root.get("adresGlownegoMiejscaWykonywaniaDzialalnosci")
                .and_then(|v| extract_address(v, AddressKind::Main))
        });

    let correspondence_address = root
        .get("adresDoKorespondencji")
        .and_then(|v| extract_address(v, AddressKind::Correspondence));

    let mut business_addresses = Vec::new();
    if let Some(extra) = root.get("dodatkoweMiejscaWykonywaniaDzialalnosci") {
        for entry in coerce_entries(extra) {
            if let Some(address) = extract_address(entry, AddressKind::Business) {
                business_addresses.push(address);
            }
        }
    }

    let (pkd_main, pkd_codes) = extract_pkd(root);

    let kontakt = section(root, "kontakt");
    let email = str_at(kontakt, "email").or_else(|| str_at(root, "email"));
    let website = str_at(kontakt, "stronaWww")
        .or_else(|| str_at(root, "www"))
        .or_else(|| str_at(root, "stronaInternetowa"));
    let phone = str_at(kontakt, "telefon").or_else(|| str_at(root, "telefon"));

    let status = str_at(root, "status").map(|s| s.to_uppercase());

    CeidgProfile {
        ceidg_id: str_at(root, "id").or_else(|| str_at(root, "identyfikatorWpisu")),
        nip: str_at(root, "nip").or_else(|| str_at(owner, "nip")),
        regon: str_at(root, "regon"),
        first_name: str_at(owner, "imie").or_else(|| str_at(root, "imie")),
        last_name: str_at(owner, "nazwisko").or_else(|| str_at(root, "nazwisko")),
        business_name,
        status,
        start_date: date_at(root, "dataRozpoczeciaDzialalnosci"),
        end_date: date_at(root, "dataZakonczeniaDzialalnosci"),
        suspension_date: date_at(root, "dataZawieszeniaDzialalnosci"),
        resume_date: date_at(root, "dataWznowieniaDzialalnosci"),
        main_address,
        correspondence_address,
        business_addresses,
        email,
        website,
        phone,
        pkd_main,
        pkd_codes,
        raw_payload: Some(entry.clone()),
    }
}

fn date_at(map: &Map<String, Value>, key: &str) -> Option<chrono::NaiveDate> {
    str_at(map, key).as_deref().and_then(parse_date)
}

/// PKD entries arrive as objects with a `przewazajace` (principal) flag, or
/// as plain code strings. The main code is the first entry flagged as
/// principal, else the first code seen. Codes are deduplicated in order.
fn extract_pkd(root: &Map<String, Value>) -> (Option<String>, Vec<String>) {
    let mut codes: Vec<String> = Vec::new();
    let mut main = None;
    let mut main_is_flagged = false;

    let entries = root.get("pkd").map(coerce_entries).unwrap_or_default();
    for entry in entries {
        let code = match entry {
            Value::Object(map) => {
                let Some(code) = str_at(map, "kod") else {
                    continue;
                };
                let flagged = map.get("przewazajace").map_or(false, is_truthy);
                if flagged && !main_is_flagged {
                    main = Some(code.clone());
                    main_is_flagged = true;
                }
                code
            }
            other => match coerce_str(other) {
                Some(code) => code,
                None => continue,
            },
        };

        if !codes.contains(&code) {
            codes.push(code.clone());
        }
        if main.is_none() {
            main = Some(code);
        }
    }

    (main, codes)
}

fn extract_address(value: &Value, kind: AddressKind) -> Option<NormalizedAddress> {
    let map = coerce_object(value)?;
    if map.is_empty() {
        return None;
    }

    let mut address = NormalizedAddress::new(kind);
    if let Some(country) = str_at(map, "kraj") {
        address.country = country;
    }
    address.voivodeship = str_at(map, "wojewodztwo");
    address.county = str_at(map, "powiat");
    address.commune = str_at(map, "gmina");
    address.city = str_at(map, "miejscowosc");
    address.postal_code = str_at(map, "kodPocztowy");
    address.post_office = str_at(map, "poczta");
    address.street = str_at(map, "ulica");
    address.building_no = str_at(map, "budynek").or_else(|| str_at(map, "nrNieruchomosci"));
    address.unit_no = str_at(map, "lokal").or_else(|| str_at(map, "nrLokalu"));
    Some(address)
}
