//! Normalization of raw KRS extracts into [`KrsProfile`].
//!
//! The extract format has drifted across registry versions: sections arrive
//! as objects or singleton lists, identifier history is a list whose latest
//! entry is authoritative, and several name fields are wrapped with entry
//! revision markers. Every step degrades to an absent field instead of
//! failing the normalization.

use serde_json::{Map, Value};

use crate::coerce::{
    coerce_entries, coerce_object, empty_object, parse_date, section, section_or_self, str_at,
};
use crate::model::{AddressKind, KrsProfile, NormalizedAddress, Representative};

/// Normalize a decoded KRS payload. Never fails; missing or malformed
/// sub-structures simply leave their fields unset.
pub fn normalize(payload: &Value) -> KrsProfile {
    let root = coerce_object(payload).unwrap_or_else(|| empty_object());

    // Older responses omit the odpis/dane envelopes entirely.
    let odpis = section_or_self(root, "odpis");
    let dane = section_or_self(odpis, "dane");

    let naglowek = header_section(odpis);
    let krs_number = str_at(naglowek, "numerKRS");

    let dzial1 = section(dane, "dzial1");
    let dane_podmiotu = section(dzial1, "danePodmiotu");

    let (nip, regon) = extract_identifiers(dane_podmiotu);

    let siedziba = section(dzial1, "siedzibaIAdres");
    let seat_address = extract_address(section(siedziba, "adres"), AddressKind::Main);

    let (pkd_main, pkd_codes) = extract_pkd(dane);
    let representatives = extract_representatives(dane);

    // Contact details, when present at all, sit next to the seat address.
    let email = str_at(siedziba, "adresEmail").or_else(|| str_at(siedziba, "email"));
    let website =
        str_at(siedziba, "adresStronyInternetowej").or_else(|| str_at(siedziba, "www"));
    let phone = str_at(siedziba, "telefon");

    let kapital = section(dzial1, "kapital");
    let share_capital = str_at(kapital, "wysokoscKapitaluZakladowego");
    let share_capital_currency = str_at(kapital, "waluta").or_else(|| {
        share_capital.as_ref().map(|_| "PLN".to_string())
    });

    KrsProfile {
        krs: krs_number,
        nip,
        regon,
        official_name: str_at(dane_podmiotu, "nazwa"),
        short_name: str_at(dane_podmiotu, "nazwaSkrocona"),
        legal_form: str_at(dane_podmiotu, "formaPrawna"),
        legal_form_code: str_at(dane_podmiotu, "kodFormyPrawnej"),
        registry_status: str_at(dane_podmiotu, "status"),
        registration_date: str_at(dane_podmiotu, "dataRejestracjiWKRS")
            .as_deref()
            .and_then(parse_date),
        seat_address,
        correspondence_address: None,
        email,
        website,
        phone,
        share_capital,
        share_capital_currency,
        pkd_main,
        pkd_codes,
        representatives,
        raw_payload: Some(payload.clone()),
    }
}

/// Registry headers come as `naglowekP` (full extract) or `naglowekA`.
fn header_section(odpis: &Map<String, Value>) -> &Map<String, Value> {
    let primary = odpis.get("naglowekP").and_then(coerce_object);
    match primary {
        Some(map) if !map.is_empty() => map,
        _ => section(odpis, "naglowekA"),
    }
}

/// Walk the historical identifier entries in reverse; the most recent entry
/// is last, and the first non-absent value per kind wins. Stops early once
/// both identifiers are resolved.
fn extract_identifiers(dane_podmiotu: &Map<String, Value>) -> (Option<String>, Option<String>) {
    let mut nip = None;
    let mut regon = None;

    match dane_podmiotu.get("identyfikatory") {
        Some(Value::Array(entries)) => {
            for entry in entries.iter().rev() {
                let Some(entry) = coerce_object(entry) else {
                    continue;
                };
                let inner = entry
                    .get("identyfikatory")
                    .and_then(coerce_object)
                    .unwrap_or(entry);
                if nip.is_none() {
                    nip = str_at(inner, "nip");
                }
                if regon.is_none() {
                    regon = str_at(inner, "regon");
                }
                if nip.is_some() && regon.is_some() {
                    break;
                }
            }
        }
        Some(Value::Object(map)) => {
            // Degenerate single-entry form.
            let inner = map.get("identyfikatory").and_then(coerce_object).unwrap_or(map);
            nip = str_at(inner, "nip");
            regon = str_at(inner, "regon");
        }
        _ => {}
    }

    (nip, regon)
}

fn extract_pkd(dane: &Map<String, Value>) -> (Option<String>, Vec<String>) {
    let dzial3 = section(dane, "dzial3");
    let przedmiot = section(dzial3, "przedmiotDzialalnosci");

    let mut codes: Vec<String> = Vec::new();
    let mut main = None;

    let entries = przedmiot
        .get("przedmiotPrzewazajacejDzialalnosci")
        .map(coerce_entries)
        .unwrap_or_default();
    for entry in entries {
        let Some(entry) = coerce_object(entry) else {
            continue;
        };
        let code = str_at(entry, "kodDzial").or_else(|| str_at(entry, "kod"));
        if let Some(code) = code {
            if !codes.contains(&code) {
                codes.push(code.clone());
            }
            if main.is_none() {
                main = Some(code);
            }
        }
    }

    (main, codes)
}

fn extract_representatives(dane: &Map<String, Value>) -> Vec<Representative> {
    let dzial2 = section(dane, "dzial2");
    let reprezentacja = section(dzial2, "reprezentacja");

    let mut representatives = Vec::new();
    let entries = reprezentacja
        .get("skladOrganu")
        .map(coerce_entries)
        .unwrap_or_default();
    for entry in entries {
        let Some(osoba) = coerce_object(entry) else {
            continue;
        };
        let given = str_at(osoba, "imiona").unwrap_or_default();
        let surname = str_at(osoba, "nazwisko").unwrap_or_default();
        let name = format!("{given} {surname}").trim().to_string();
        if name.is_empty() {
            continue;
        }

        let ident = section(osoba, "identyfikator");
        representatives.push(Representative {
            name,
            function: str_at(osoba, "funkcjaWOrganie"),
            pesel: str_at(ident, "pesel"),
        });
    }
    representatives
}

fn extract_address(map: &Map<String, Value>, kind: AddressKind) -> Option<NormalizedAddress> {
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
    address.building_no = str_at(map, "nrDomu");
    address.unit_no = str_at(map, "nrLokalu");
    Some(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_extract() -> Value {
        json!({
            "odpis": {
                "naglowekP": {"numerKRS": "0000012345"},
                "dane": {
                    "dzial1": {
                        "danePodmiotu": {
                            "nazwa": "TEST SP. Z O.O.",
                            "nazwaSkrocona": [{"nazwaSkrocona": "TEST", "nrWpisuWprow": "1"}],
                            "formaPrawna": "SPÓŁKA Z OGRANICZONĄ ODPOWIEDZIALNOŚCIĄ",
                            "kodFormyPrawnej": "117",
                            "status": "AKTYWNY",
                            "dataRejestracjiWKRS": "2005-06-01",
                            "identyfikatory": [
                                {"identyfikatory": {"nip": "111-111-11-11", "regon": "111111111"}},
                                {"identyfikatory": {"nip": "1234567890", "regon": "123456785"}}
                            ]
                        },
                        "siedzibaIAdres": {
                            "adres": {
                                "kraj": "POLSKA",
                                "wojewodztwo": "MAŁOPOLSKIE",
                                "miejscowosc": "KRAKÓW",
                                "kodPocztowy": "31-001",
                                "ulica": "FLORIAŃSKA",
                                "nrDomu": "12"
                            },
                            "adresEmail": "biuro@test.pl",
                            "adresStronyInternetowej": "https://test.pl"
                        },
                        "kapital": {"wysokoscKapitaluZakladowego": "50000,00"}
                    },
                    "dzial2": {
                        "reprezentacja": {
                            "skladOrganu": [
                                {
                                    "imiona": "JAN MAREK",
                                    "nazwisko": "KOWALSKI",
                                    "funkcjaWOrganie": "PREZES ZARZĄDU",
                                    "identyfikator": {"pesel": "80010112345"}
                                },
                                {"funkcjaWOrganie": "CZŁONEK ZARZĄDU"}
                            ]
                        }
                    },
                    "dzial3": {
                        "przedmiotDzialalnosci": {
                            "przedmiotPrzewazajacejDzialalnosci": [
                                {"kodDzial": "62.01"},
                                {"kod": "62.02"},
                                {"kodDzial": "62.01"}
                            ]
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn normalizes_a_full_extract() {
        let profile = normalize(&full_extract());

        assert_eq!(profile.krs.as_deref(), Some("0000012345"));
        assert_eq!(profile.official_name.as_deref(), Some("TEST SP. Z O.O."));
        assert_eq!(profile.short_name.as_deref(), Some("TEST"));
        assert_eq!(profile.legal_form_code.as_deref(), Some("117"));
        assert_eq!(profile.registry_status.as_deref(), Some("AKTYWNY"));
        assert_eq!(
            profile.registration_date,
            chrono::NaiveDate::from_ymd_opt(2005, 6, 1)
        );
        assert_eq!(profile.share_capital.as_deref(), Some("50000,00"));
        assert_eq!(profile.share_capital_currency.as_deref(), Some("PLN"));
        assert_eq!(profile.email.as_deref(), Some("biuro@test.pl"));
        assert_eq!(profile.website.as_deref(), Some("https://test.pl"));
        assert!(profile.phone.is_none());
        assert!(profile.raw_payload.is_some());

        let seat = profile.seat_address.expect("seat address");
        assert_eq!(seat.kind, AddressKind::Main);
        assert_eq!(seat.country, "POLSKA");
        assert_eq!(seat.city.as_deref(), Some("KRAKÓW"));
        assert_eq!(seat.building_no.as_deref(), Some("12"));
    }

    #[test]
    fn identifier_recency_prefers_the_latest_entry() {
        let profile = normalize(&full_extract());
        // Two historical entries; the reverse scan keeps the later one.
        assert_eq!(profile.nip.as_deref(), Some("1234567890"));
        assert_eq!(profile.regon.as_deref(), Some("123456785"));
    }

    #[test]
    fn identifier_history_fills_gaps_from_older_entries() {
        let payload = json!({
            "odpis": {
                "dane": {
                    "dzial1": {
                        "danePodmiotu": {
                            "identyfikatory": [
                                {"identyfikatory": {"nip": "1111111111", "regon": "999999999"}},
                                {"identyfikatory": {"nip": "1234567890"}}
                            ]
                        }
                    }
                }
            }
        });
        let profile = normalize(&payload);
        assert_eq!(profile.nip.as_deref(), Some("1234567890"));
        assert_eq!(profile.regon.as_deref(), Some("999999999"));
    }

    #[test]
    fn identifier_section_accepts_the_single_dict_form() {
        let payload = json!({
            "odpis": {
                "dane": {
                    "dzial1": {
                        "danePodmiotu": {
                            "identyfikatory": {"nip": "1234567890", "regon": "123456785"}
                        }
                    }
                }
            }
        });
        let profile = normalize(&payload);
        assert_eq!(profile.nip.as_deref(), Some("1234567890"));
        assert_eq!(profile.regon.as_deref(), Some("123456785"));
    }

    #[test]
    fn pkd_codes_are_deduplicated_in_order() {
        let profile = normalize(&full_extract());
        assert_eq!(profile.pkd_codes, vec!["62.01", "62.02"]);
        assert_eq!(profile.pkd_main.as_deref(), Some("62.01"));
    }

    #[test]
    fn representatives_without_a_name_are_discarded() {
        let profile = normalize(&full_extract());
        assert_eq!(profile.representatives.len(), 1);

        let rep = &profile.representatives[0];
        assert_eq!(rep.name, "JAN MAREK KOWALSKI");
        assert_eq!(rep.function.as_deref(), Some("PREZES ZARZĄDU"));
        assert_eq!(rep.pesel.as_deref(), Some("80010112345"));
    }

    #[test]
    fn malformed_payloads_degrade_to_an_empty_profile() {
        for payload in [
            json!(null),
            json!("not an object"),
            json!([]),
            json!({"odpis": "truncated"}),
            json!({"odpis": {"dane": {"dzial1": []}}}),
        ] {
            let profile = normalize(&payload);
            assert!(profile.krs.is_none());
            assert!(profile.nip.is_none());
            assert!(profile.seat_address.is_none());
            assert!(profile.pkd_codes.is_empty());
            assert!(profile.representatives.is_empty());
        }
    }

    #[test]
    fn payload_without_envelopes_is_read_in_place() {
        let payload = json!({
            "dane": {
                "dzial1": {
                    "danePodmiotu": {"nazwa": "BEZPOŚREDNI SA"}
                }
            }
        });
        let profile = normalize(&payload);
        assert_eq!(profile.official_name.as_deref(), Some("BEZPOŚREDNI SA"));
    }

    #[test]
    fn missing_country_defaults_to_pl() {
        let payload = json!({
            "odpis": {
                "dane": {
                    "dzial1": {
                        "siedzibaIAdres": {"adres": {"miejscowosc": "WARSZAWA"}}
                    }
                }
            }
        });
        let profile = normalize(&payload);
        let seat = profile.seat_address.expect("seat address");
        assert_eq!(seat.country, "PL");
        assert_eq!(seat.city.as_deref(), Some("WARSZAWA"));
    }
}
